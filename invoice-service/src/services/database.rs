//! Database service for invoice-service.

use crate::models::{
    AssignmentRule, AuditEvent, CreateAssignmentRule, CreateInvoiceRecord, InvoiceRecord,
    InvoiceStatus, ModuleType, NewAuditEvent, PaymentStatus, RuleKind, SyncRun, SyncRunStatus,
    SyncTrigger,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    AuditStore, InvoiceStore, ModuleGateway, RuleStore, SyncRunStore,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoice-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for Database {
    #[instrument(skip(self, input), fields(invoice_number = %input.invoice_number))]
    async fn insert(&self, input: CreateInvoiceRecord) -> Result<InvoiceRecord, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        let invoice_id = Uuid::new_v4();
        let status = input.status();
        let invoice = sqlx::query_as::<_, InvoiceRecord>(
            r#"
            INSERT INTO invoices (
                invoice_id, external_reference, direction, source,
                seller_name, seller_tax_id, buyer_name, buyer_tax_id,
                invoice_number, issue_date, net_amount, tax_amount, gross_amount,
                currency, description, status, payment_status,
                assigned_user_id, assigned_module, assigned_farm_id, module_entity_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING invoice_id, external_reference, direction, source,
                seller_name, seller_tax_id, buyer_name, buyer_tax_id,
                invoice_number, issue_date, net_amount, tax_amount, gross_amount,
                currency, description, status, payment_status,
                assigned_user_id, assigned_module, assigned_farm_id, module_entity_id,
                created_utc, updated_utc, deleted_utc
            "#,
        )
        .bind(invoice_id)
        .bind(&input.external_reference)
        .bind(input.direction.as_str())
        .bind(input.source.as_str())
        .bind(&input.seller_name)
        .bind(&input.seller_tax_id)
        .bind(&input.buyer_name)
        .bind(&input.buyer_tax_id)
        .bind(&input.invoice_number)
        .bind(input.issue_date)
        .bind(input.net_amount)
        .bind(input.tax_amount)
        .bind(input.gross_amount)
        .bind(&input.currency)
        .bind(&input.description)
        .bind(status.as_str())
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(input.assigned_user_id)
        .bind(input.assigned_module.map(|m| m.as_str()))
        .bind(input.assigned_farm_id)
        .bind(input.module_entity_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice with external reference {:?} already exists",
                    input.external_reference
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert invoice: {}", e)),
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, invoice_number = %invoice.invoice_number, "Invoice created");

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn get(&self, invoice_id: Uuid) -> Result<Option<InvoiceRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, InvoiceRecord>(
            r#"
            SELECT invoice_id, external_reference, direction, source,
                seller_name, seller_tax_id, buyer_name, buyer_tax_id,
                invoice_number, issue_date, net_amount, tax_amount, gross_amount,
                currency, description, status, payment_status,
                assigned_user_id, assigned_module, assigned_farm_id, module_entity_id,
                created_utc, updated_utc, deleted_utc
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<InvoiceRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_by_external_reference"])
            .start_timer();

        let invoice = sqlx::query_as::<_, InvoiceRecord>(
            r#"
            SELECT invoice_id, external_reference, direction, source,
                seller_name, seller_tax_id, buyer_name, buyer_tax_id,
                invoice_number, issue_date, net_amount, tax_amount, gross_amount,
                currency, description, status, payment_status,
                assigned_user_id, assigned_module, assigned_farm_id, module_entity_id,
                created_utc, updated_utc, deleted_utc
            FROM invoices
            WHERE external_reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to find invoice by external reference: {}",
                e
            ))
        })?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice_status"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $2, updated_utc = NOW()
            WHERE invoice_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(invoice_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice status: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} not found",
                invoice_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_payment_status(
        &self,
        invoice_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_payment_status"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET payment_status = $2, updated_utc = NOW()
            WHERE invoice_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(invoice_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update payment status: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} not found",
                invoice_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn link_module_entity(
        &self,
        invoice_id: Uuid,
        module: ModuleType,
        entity_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["link_module_entity"])
            .start_timer();

        // an invoice cannot be linked to two module entities
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET assigned_module = $2, module_entity_id = $3, updated_utc = NOW()
            WHERE invoice_id = $1 AND deleted_utc IS NULL AND module_entity_id IS NULL
            "#,
        )
        .bind(invoice_id)
        .bind(module.as_str())
        .bind(entity_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to link module entity: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is missing or already linked to a module entity",
                invoice_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn soft_delete(&self, invoice_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["soft_delete_invoice"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET deleted_utc = NOW(), updated_utc = NOW()
            WHERE invoice_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to soft-delete invoice: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} not found",
                invoice_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RuleStore for Database {
    #[instrument(skip(self, input))]
    async fn insert(&self, input: CreateAssignmentRule) -> Result<AssignmentRule, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_rule"])
            .start_timer();

        // next priority over non-deleted rules of this kind; gaps allowed
        let next_priority: i32 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(priority), 0) + 1
            FROM assignment_rules
            WHERE kind = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(input.kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute rule priority: {}", e))
        })?;

        let rule_id = Uuid::new_v4();
        let rule = sqlx::query_as::<_, AssignmentRule>(
            r#"
            INSERT INTO assignment_rules (
                rule_id, kind, priority, active, match_tax_id, match_text,
                target_user_id, target_module, target_farm_id
            )
            VALUES ($1, $2, $3, TRUE, $4, $5, $6, $7, $8)
            RETURNING rule_id, kind, priority, active, match_tax_id, match_text,
                target_user_id, target_module, target_farm_id, created_utc, deleted_utc
            "#,
        )
        .bind(rule_id)
        .bind(input.kind.as_str())
        .bind(next_priority)
        .bind(&input.match_tax_id)
        .bind(&input.match_text)
        .bind(input.target_user_id)
        .bind(input.target_module.map(|m| m.as_str()))
        .bind(input.target_farm_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert rule: {}", e)))?;

        timer.observe_duration();

        info!(rule_id = %rule.rule_id, kind = %rule.kind, priority = rule.priority, "Assignment rule created");

        Ok(rule)
    }

    #[instrument(skip(self))]
    async fn list_active(&self, kind: RuleKind) -> Result<Vec<AssignmentRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_rules"])
            .start_timer();

        let rules = sqlx::query_as::<_, AssignmentRule>(
            r#"
            SELECT rule_id, kind, priority, active, match_tax_id, match_text,
                target_user_id, target_module, target_farm_id, created_utc, deleted_utc
            FROM assignment_rules
            WHERE kind = $1 AND active = TRUE AND deleted_utc IS NULL
            ORDER BY priority, created_utc, rule_id
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list rules: {}", e)))?;

        timer.observe_duration();

        Ok(rules)
    }

    #[instrument(skip(self))]
    async fn deactivate(&self, rule_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["deactivate_rule"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE assignment_rules
            SET active = FALSE
            WHERE rule_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(rule_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate rule: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Rule {} not found",
                rule_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn soft_delete(&self, rule_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["soft_delete_rule"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE assignment_rules
            SET deleted_utc = NOW()
            WHERE rule_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(rule_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to soft-delete rule: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Rule {} not found",
                rule_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for Database {
    #[instrument(skip(self, event), fields(invoice_id = %event.invoice_id))]
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_audit_event"])
            .start_timer();

        let event_id = Uuid::new_v4();
        let appended = sqlx::query_as::<_, AuditEvent>(
            r#"
            INSERT INTO audit_events (
                event_id, invoice_id, action, previous_status, new_status,
                actor_id, actor_name, comment
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING event_id, invoice_id, action, previous_status, new_status,
                actor_id, actor_name, comment, occurred_utc
            "#,
        )
        .bind(event_id)
        .bind(event.invoice_id)
        .bind(event.action.as_str())
        .bind(&event.previous_status)
        .bind(&event.new_status)
        .bind(event.actor.id)
        .bind(&event.actor.name)
        .bind(&event.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to append audit event: {}", e))
        })?;

        timer.observe_duration();

        Ok(appended)
    }

    #[instrument(skip(self))]
    async fn history_for(&self, invoice_id: Uuid) -> Result<Vec<AuditEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["audit_history"])
            .start_timer();

        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT event_id, invoice_id, action, previous_status, new_status,
                actor_id, actor_name, comment, occurred_utc
            FROM audit_events
            WHERE invoice_id = $1
            ORDER BY occurred_utc, event_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load audit history: {}", e))
        })?;

        timer.observe_duration();

        Ok(events)
    }

    #[instrument(skip(self))]
    async fn by_actor(
        &self,
        actor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["audit_by_actor"])
            .start_timer();

        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT event_id, invoice_id, action, previous_status, new_status,
                actor_id, actor_name, comment, occurred_utc
            FROM audit_events
            WHERE actor_id = $1
              AND ($2::timestamptz IS NULL OR occurred_utc >= $2)
              AND ($3::timestamptz IS NULL OR occurred_utc <= $3)
            ORDER BY occurred_utc, event_id
            "#,
        )
        .bind(actor_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load actor audit events: {}", e))
        })?;

        timer.observe_duration();

        Ok(events)
    }
}

#[async_trait]
impl SyncRunStore for Database {
    #[instrument(skip(self))]
    async fn open(&self, trigger: SyncTrigger) -> Result<SyncRun, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_sync_run"])
            .start_timer();

        let run_id = Uuid::new_v4();
        let run = sqlx::query_as::<_, SyncRun>(
            r#"
            INSERT INTO sync_runs (run_id, trigger_mode, status)
            VALUES ($1, $2, 'running')
            RETURNING run_id, trigger_mode, status, started_utc, completed_utc,
                fetched_count, failed_count, error_message
            "#,
        )
        .bind(run_id)
        .bind(trigger.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to open sync run: {}", e)))?;

        timer.observe_duration();

        Ok(run)
    }

    #[instrument(skip(self))]
    async fn close(
        &self,
        run_id: Uuid,
        status: SyncRunStatus,
        fetched_count: i32,
        failed_count: i32,
        error_message: Option<String>,
    ) -> Result<SyncRun, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["close_sync_run"])
            .start_timer();

        let run = sqlx::query_as::<_, SyncRun>(
            r#"
            UPDATE sync_runs
            SET status = $2, completed_utc = NOW(), fetched_count = $3,
                failed_count = $4, error_message = $5
            WHERE run_id = $1
            RETURNING run_id, trigger_mode, status, started_utc, completed_utc,
                fetched_count, failed_count, error_message
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(fetched_count)
        .bind(failed_count)
        .bind(&error_message)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to close sync run: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Sync run {} not found", run_id)))?;

        timer.observe_duration();

        Ok(run)
    }

    #[instrument(skip(self))]
    async fn last_successful_end(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["last_successful_end"])
            .start_timer();

        let completed: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            r#"
            SELECT completed_utc
            FROM sync_runs
            WHERE status = 'success'
            ORDER BY started_utc DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to read last sync checkpoint: {}", e))
        })?;

        timer.observe_duration();

        Ok(completed.flatten())
    }

    #[instrument(skip(self))]
    async fn list(&self, count: i64) -> Result<Vec<SyncRun>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_sync_runs"])
            .start_timer();

        let runs = sqlx::query_as::<_, SyncRun>(
            r#"
            SELECT run_id, trigger_mode, status, started_utc, completed_utc,
                fetched_count, failed_count, error_message
            FROM sync_runs
            ORDER BY started_utc DESC
            LIMIT $1
            "#,
        )
        .bind(count.clamp(1, 100))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list sync runs: {}", e)))?;

        timer.observe_duration();

        Ok(runs)
    }
}

/// Payment-marker access to one module's entity table.
pub struct PgModuleGateway {
    pool: PgPool,
    module: ModuleType,
}

impl PgModuleGateway {
    pub fn new(db: &Database, module: ModuleType) -> Self {
        Self {
            pool: db.pool().clone(),
            module,
        }
    }

    fn table(&self) -> &'static str {
        match self.module {
            ModuleType::Feed => "feed_invoices",
            ModuleType::Sale => "sale_invoices",
            ModuleType::Gas => "gas_deliveries",
        }
    }
}

#[async_trait]
impl ModuleGateway for PgModuleGateway {
    fn module(&self) -> ModuleType {
        self.module
    }

    #[instrument(skip(self), fields(module = self.module.as_str()))]
    async fn payment_marker(&self, entity_id: Uuid) -> Result<Option<NaiveDate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["payment_marker"])
            .start_timer();

        let query = format!("SELECT paid_on FROM {} WHERE entity_id = $1", self.table());
        let marker: Option<Option<NaiveDate>> = sqlx::query_scalar(&query)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to read payment marker: {}", e))
            })?;

        timer.observe_duration();

        marker.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "{} entity {} not found",
                self.module.as_str(),
                entity_id
            ))
        })
    }

    #[instrument(skip(self), fields(module = self.module.as_str()))]
    async fn set_payment_marker(
        &self,
        entity_id: Uuid,
        paid_on: Option<NaiveDate>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_payment_marker"])
            .start_timer();

        let query = format!(
            "UPDATE {} SET paid_on = $2, updated_utc = NOW() WHERE entity_id = $1",
            self.table()
        );
        let result = sqlx::query(&query)
            .bind(entity_id)
            .bind(paid_on)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to set payment marker: {}", e))
            })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "{} entity {} not found",
                self.module.as_str(),
                entity_id
            )));
        }
        Ok(())
    }
}
