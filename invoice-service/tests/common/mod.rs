//! Test helper module for invoice-service integration tests.
//!
//! Provides in-memory implementations of the storage and gateway seams so
//! the suites run without PostgreSQL or a live registry.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use invoice_service::models::{
    AssignmentRule, AuditEvent, CreateAssignmentRule, CreateInvoiceRecord, InvoiceRecord,
    InvoiceStatus, ModuleType, NewAuditEvent, PaymentStatus, RuleKind, SyncRun, SyncRunStatus,
    SyncTrigger,
};
use invoice_service::services::registry::{InvoiceReference, RegistryClient};
use invoice_service::services::store::{
    AuditStore, InvoiceStore, ModuleGateway, RuleStore, SyncRunStore,
};
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Valid test NIPs (correct checksum).
pub const FARM_NIP: &str = "7010001453";
pub const SUPPLIER_NIP: &str = "5260250274";
pub const OTHER_NIP: &str = "1111111111";

/// In-memory implementation of every store trait, mirroring the Postgres
/// `Database`.
#[derive(Default)]
pub struct MemoryStore {
    invoices: Mutex<Vec<InvoiceRecord>>,
    rules: Mutex<Vec<AssignmentRule>>,
    events: Mutex<Vec<AuditEvent>>,
    runs: Mutex<Vec<SyncRun>>,
    /// When set, the next audit appends fail; exercises the
    /// audit-failure-aborts-operation contract.
    fail_audit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_audit_appends(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.lock().unwrap().len()
    }

    pub fn all_events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, invoice_id: Uuid) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    pub fn all_runs(&self) -> Vec<SyncRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn insert(&self, input: CreateInvoiceRecord) -> Result<InvoiceRecord, AppError> {
        let mut invoices = self.invoices.lock().unwrap();
        if let Some(reference) = &input.external_reference {
            if invoices
                .iter()
                .any(|invoice| invoice.external_reference.as_deref() == Some(reference.as_str()))
            {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice with external reference {:?} already exists",
                    reference
                )));
            }
        }

        let now = Utc::now();
        let record = InvoiceRecord {
            invoice_id: Uuid::new_v4(),
            external_reference: input.external_reference.clone(),
            direction: input.direction.as_str().to_string(),
            source: input.source.as_str().to_string(),
            seller_name: input.seller_name.clone(),
            seller_tax_id: input.seller_tax_id.clone(),
            buyer_name: input.buyer_name.clone(),
            buyer_tax_id: input.buyer_tax_id.clone(),
            invoice_number: input.invoice_number.clone(),
            issue_date: input.issue_date,
            net_amount: input.net_amount,
            tax_amount: input.tax_amount,
            gross_amount: input.gross_amount,
            currency: input.currency.clone(),
            description: input.description.clone(),
            status: input.status().as_str().to_string(),
            payment_status: PaymentStatus::Unpaid.as_str().to_string(),
            assigned_user_id: input.assigned_user_id,
            assigned_module: input.assigned_module.map(|m| m.as_str().to_string()),
            assigned_farm_id: input.assigned_farm_id,
            module_entity_id: input.module_entity_id,
            created_utc: now,
            updated_utc: now,
            deleted_utc: None,
        };
        invoices.push(record.clone());
        Ok(record)
    }

    async fn get(&self, invoice_id: Uuid) -> Result<Option<InvoiceRecord>, AppError> {
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .find(|invoice| invoice.invoice_id == invoice_id)
            .cloned())
    }

    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<InvoiceRecord>, AppError> {
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .find(|invoice| invoice.external_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn update_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<(), AppError> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .iter_mut()
            .find(|invoice| invoice.invoice_id == invoice_id && invoice.deleted_utc.is_none())
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;
        invoice.status = status.as_str().to_string();
        invoice.updated_utc = Utc::now();
        Ok(())
    }

    async fn update_payment_status(
        &self,
        invoice_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .iter_mut()
            .find(|invoice| invoice.invoice_id == invoice_id && invoice.deleted_utc.is_none())
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;
        invoice.payment_status = status.as_str().to_string();
        invoice.updated_utc = Utc::now();
        Ok(())
    }

    async fn link_module_entity(
        &self,
        invoice_id: Uuid,
        module: ModuleType,
        entity_id: Uuid,
    ) -> Result<(), AppError> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .iter_mut()
            .find(|invoice| {
                invoice.invoice_id == invoice_id
                    && invoice.deleted_utc.is_none()
                    && invoice.module_entity_id.is_none()
            })
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} is missing or already linked to a module entity",
                    invoice_id
                ))
            })?;
        invoice.assigned_module = Some(module.as_str().to_string());
        invoice.module_entity_id = Some(entity_id);
        invoice.updated_utc = Utc::now();
        Ok(())
    }

    async fn soft_delete(&self, invoice_id: Uuid) -> Result<(), AppError> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .iter_mut()
            .find(|invoice| invoice.invoice_id == invoice_id && invoice.deleted_utc.is_none())
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;
        invoice.deleted_utc = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn insert(&self, input: CreateAssignmentRule) -> Result<AssignmentRule, AppError> {
        let mut rules = self.rules.lock().unwrap();
        let next_priority = rules
            .iter()
            .filter(|rule| rule.kind == input.kind.as_str() && rule.deleted_utc.is_none())
            .map(|rule| rule.priority)
            .max()
            .unwrap_or(0)
            + 1;

        let rule = AssignmentRule {
            rule_id: Uuid::new_v4(),
            kind: input.kind.as_str().to_string(),
            priority: next_priority,
            active: true,
            match_tax_id: input.match_tax_id,
            match_text: input.match_text,
            target_user_id: input.target_user_id,
            target_module: input.target_module.map(|m| m.as_str().to_string()),
            target_farm_id: input.target_farm_id,
            created_utc: Utc::now(),
            deleted_utc: None,
        };
        rules.push(rule.clone());
        Ok(rule)
    }

    async fn list_active(&self, kind: RuleKind) -> Result<Vec<AssignmentRule>, AppError> {
        let mut rules: Vec<AssignmentRule> = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|rule| {
                rule.kind == kind.as_str() && rule.active && rule.deleted_utc.is_none()
            })
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_utc.cmp(&b.created_utc))
                .then(a.rule_id.cmp(&b.rule_id))
        });
        Ok(rules)
    }

    async fn deactivate(&self, rule_id: Uuid) -> Result<(), AppError> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|rule| rule.rule_id == rule_id && rule.deleted_utc.is_none())
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Rule {} not found", rule_id)))?;
        rule.active = false;
        Ok(())
    }

    async fn soft_delete(&self, rule_id: Uuid) -> Result<(), AppError> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|rule| rule.rule_id == rule_id && rule.deleted_utc.is_none())
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Rule {} not found", rule_id)))?;
        rule.deleted_utc = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AppError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected audit append failure"
            )));
        }
        let appended = AuditEvent {
            event_id: Uuid::new_v4(),
            invoice_id: event.invoice_id,
            action: event.action.as_str().to_string(),
            previous_status: event.previous_status,
            new_status: event.new_status,
            actor_id: event.actor.id,
            actor_name: event.actor.name,
            comment: event.comment,
            occurred_utc: Utc::now(),
        };
        self.events.lock().unwrap().push(appended.clone());
        Ok(appended)
    }

    async fn history_for(&self, invoice_id: Uuid) -> Result<Vec<AuditEvent>, AppError> {
        let mut events: Vec<AuditEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.invoice_id == invoice_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.occurred_utc);
        Ok(events)
    }

    async fn by_actor(
        &self,
        actor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, AppError> {
        let mut events: Vec<AuditEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.actor_id == Some(actor_id))
            .filter(|event| from.is_none_or(|from| event.occurred_utc >= from))
            .filter(|event| to.is_none_or(|to| event.occurred_utc <= to))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.occurred_utc);
        Ok(events)
    }
}

#[async_trait]
impl SyncRunStore for MemoryStore {
    async fn open(&self, trigger: SyncTrigger) -> Result<SyncRun, AppError> {
        let run = SyncRun {
            run_id: Uuid::new_v4(),
            trigger_mode: trigger.as_str().to_string(),
            status: SyncRunStatus::Running.as_str().to_string(),
            started_utc: Utc::now(),
            completed_utc: None,
            fetched_count: 0,
            failed_count: 0,
            error_message: None,
        };
        self.runs.lock().unwrap().push(run.clone());
        Ok(run)
    }

    async fn close(
        &self,
        run_id: Uuid,
        status: SyncRunStatus,
        fetched_count: i32,
        failed_count: i32,
        error_message: Option<String>,
    ) -> Result<SyncRun, AppError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|run| run.run_id == run_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Sync run {} not found", run_id)))?;
        run.status = status.as_str().to_string();
        run.completed_utc = Some(Utc::now());
        run.fetched_count = fetched_count;
        run.failed_count = failed_count;
        run.error_message = error_message;
        Ok(run.clone())
    }

    async fn last_successful_end(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|run| run.status == SyncRunStatus::Success.as_str())
            .max_by_key(|run| run.started_utc)
            .and_then(|run| run.completed_utc))
    }

    async fn list(&self, count: i64) -> Result<Vec<SyncRun>, AppError> {
        let mut runs = self.runs.lock().unwrap().clone();
        runs.sort_by(|a, b| b.started_utc.cmp(&a.started_utc));
        runs.truncate(count as usize);
        Ok(runs)
    }
}

/// In-memory payment-marker table for one module.
pub struct MemoryModuleGateway {
    module: ModuleType,
    markers: Mutex<HashMap<Uuid, Option<NaiveDate>>>,
}

impl MemoryModuleGateway {
    pub fn new(module: ModuleType) -> Self {
        Self {
            module,
            markers: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert_entity(&self, entity_id: Uuid, paid_on: Option<NaiveDate>) {
        self.markers.lock().unwrap().insert(entity_id, paid_on);
    }

    pub fn marker(&self, entity_id: Uuid) -> Option<Option<NaiveDate>> {
        self.markers.lock().unwrap().get(&entity_id).copied()
    }
}

#[async_trait]
impl ModuleGateway for MemoryModuleGateway {
    fn module(&self) -> ModuleType {
        self.module
    }

    async fn payment_marker(&self, entity_id: Uuid) -> Result<Option<NaiveDate>, AppError> {
        self.markers
            .lock()
            .unwrap()
            .get(&entity_id)
            .copied()
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "{} entity {} not found",
                    self.module.as_str(),
                    entity_id
                ))
            })
    }

    async fn set_payment_marker(
        &self,
        entity_id: Uuid,
        paid_on: Option<NaiveDate>,
    ) -> Result<(), AppError> {
        let mut markers = self.markers.lock().unwrap();
        let entry = markers.get_mut(&entity_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "{} entity {} not found",
                self.module.as_str(),
                entity_id
            ))
        })?;
        *entry = paid_on;
        Ok(())
    }
}

/// Scripted registry stub.
#[derive(Default)]
pub struct StubRegistry {
    references: Mutex<Vec<InvoiceReference>>,
    documents: Mutex<HashMap<String, Vec<u8>>>,
    fail_listing: AtomicBool,
    failing_fetches: Mutex<HashSet<String>>,
    listing_delay: Mutex<Duration>,
    fetch_delay: Mutex<Duration>,
    last_since: Mutex<Option<DateTime<Utc>>>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one invoice: a reference plus its raw document.
    pub fn add_invoice(&self, reference: &str, document: Vec<u8>) {
        // Acquisition timestamps sit past any test run's checkpoint so a
        // second run lists the same references again and exercises dedup.
        self.references.lock().unwrap().push(InvoiceReference {
            reference_number: reference.to_string(),
            acquired_utc: Utc.with_ymd_and_hms(2099, 1, 1, 12, 0, 0).unwrap(),
        });
        self.documents
            .lock()
            .unwrap()
            .insert(reference.to_string(), document);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetch_for(&self, reference: &str) {
        self.failing_fetches
            .lock()
            .unwrap()
            .insert(reference.to_string());
    }

    pub fn failing_fetches_clear(&self) {
        self.failing_fetches.lock().unwrap().clear();
    }

    pub fn set_listing_delay(&self, delay: Duration) {
        *self.listing_delay.lock().unwrap() = delay;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    /// The `since` timestamp of the most recent listing call.
    pub fn last_since(&self) -> Option<DateTime<Utc>> {
        *self.last_since.lock().unwrap()
    }
}

#[async_trait]
impl RegistryClient for StubRegistry {
    async fn list_references_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InvoiceReference>, AppError> {
        *self.last_since.lock().unwrap() = Some(since);
        let delay = *self.listing_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(AppError::RegistryUnavailable(
                "stub registry offline".to_string(),
            ));
        }
        Ok(self
            .references
            .lock()
            .unwrap()
            .iter()
            .filter(|reference| reference.acquired_utc > since)
            .cloned()
            .collect())
    }

    async fn fetch_document(&self, reference: &InvoiceReference) -> Result<Vec<u8>, AppError> {
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing_fetches
            .lock()
            .unwrap()
            .contains(&reference.reference_number)
        {
            return Err(AppError::RegistryUnavailable(format!(
                "stub fetch failure for {}",
                reference.reference_number
            )));
        }
        self.documents
            .lock()
            .unwrap()
            .get(&reference.reference_number)
            .cloned()
            .ok_or_else(|| {
                AppError::RegistryUnavailable(format!(
                    "no document for {}",
                    reference.reference_number
                ))
            })
    }
}

/// Minimal registry document in the exchange's XML rendition.
pub fn ksef_document(
    seller_nip: &str,
    seller_name: &str,
    invoice_number: &str,
    net: &str,
    tax: &str,
    gross: &str,
) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Faktura>
  <Podmiot1>
    <DaneIdentyfikacyjne>
      <NIP>{seller_nip}</NIP>
      <Nazwa>{seller_name}</Nazwa>
    </DaneIdentyfikacyjne>
  </Podmiot1>
  <Podmiot2>
    <DaneIdentyfikacyjne>
      <NIP>{FARM_NIP}</NIP>
      <Nazwa>Gospodarstwo Rolne Testowe</Nazwa>
    </DaneIdentyfikacyjne>
  </Podmiot2>
  <Fa>
    <KodWaluty>PLN</KodWaluty>
    <P_1>2026-03-01</P_1>
    <P_2>{invoice_number}</P_2>
    <P_13_1>{net}</P_13_1>
    <P_14_1>{tax}</P_14_1>
    <P_15>{gross}</P_15>
    <FaWiersz>
      <P_7>Pasza DKA Grower luzem</P_7>
    </FaWiersz>
  </Fa>
</Faktura>"#
    )
    .into_bytes()
}
