//! Storage and module-gateway seams.
//!
//! The core components talk to persistence through these traits; the
//! Postgres implementation lives in [`super::database`], the hermetic test
//! suites provide in-memory implementations.

use crate::models::{
    AssignmentRule, AuditEvent, CreateAssignmentRule, CreateInvoiceRecord, InvoiceRecord,
    InvoiceStatus, ModuleType, NewAuditEvent, PaymentStatus, RuleKind, SyncRun, SyncRunStatus,
    SyncTrigger,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use uuid::Uuid;

/// Accounting invoice storage.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert(&self, input: CreateInvoiceRecord) -> Result<InvoiceRecord, AppError>;

    async fn get(&self, invoice_id: Uuid) -> Result<Option<InvoiceRecord>, AppError>;

    /// Lookup by KSeF reference number; the dedup anchor for ingestion.
    async fn find_by_external_reference(
        &self,
        reference: &str,
    ) -> Result<Option<InvoiceRecord>, AppError>;

    async fn update_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<(), AppError>;

    async fn update_payment_status(
        &self,
        invoice_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), AppError>;

    /// Attach the owning module entity. An invoice is linked to at most one.
    async fn link_module_entity(
        &self,
        invoice_id: Uuid,
        module: ModuleType,
        entity_id: Uuid,
    ) -> Result<(), AppError>;

    /// Invoices are never physically deleted.
    async fn soft_delete(&self, invoice_id: Uuid) -> Result<(), AppError>;
}

/// Assignment rule storage.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Inserts with priority `max(priority) + 1` over non-deleted rules of
    /// the same kind; gaps left by deletions are never reused.
    async fn insert(&self, input: CreateAssignmentRule) -> Result<AssignmentRule, AppError>;

    /// Active, non-deleted rules of one kind, ordered by priority then
    /// insertion order.
    async fn list_active(&self, kind: RuleKind) -> Result<Vec<AssignmentRule>, AppError>;

    async fn deactivate(&self, rule_id: Uuid) -> Result<(), AppError>;

    /// Soft delete; remaining priorities are not renumbered.
    async fn soft_delete(&self, rule_id: Uuid) -> Result<(), AppError>;
}

/// Append-only audit event storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AppError>;

    /// Chronological history of one invoice.
    async fn history_for(&self, invoice_id: Uuid) -> Result<Vec<AuditEvent>, AppError>;

    async fn by_actor(
        &self,
        actor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, AppError>;
}

/// Synchronization checkpoint storage.
#[async_trait]
pub trait SyncRunStore: Send + Sync {
    async fn open(&self, trigger: SyncTrigger) -> Result<SyncRun, AppError>;

    async fn close(
        &self,
        run_id: Uuid,
        status: SyncRunStatus,
        fetched_count: i32,
        failed_count: i32,
        error_message: Option<String>,
    ) -> Result<SyncRun, AppError>;

    /// End time of the most recent fully successful run; the next
    /// incremental fetch window starts there.
    async fn last_successful_end(&self) -> Result<Option<DateTime<Utc>>, AppError>;

    async fn list(&self, count: i64) -> Result<Vec<SyncRun>, AppError>;
}

/// Payment-marker access for one module type's entities.
///
/// Module entities (feed invoices, sale invoices, gas deliveries) track
/// their own nullable payment date; this is the only surface the payment
/// synchronizer touches on the module side.
#[async_trait]
pub trait ModuleGateway: Send + Sync {
    fn module(&self) -> ModuleType;

    async fn payment_marker(&self, entity_id: Uuid) -> Result<Option<NaiveDate>, AppError>;

    async fn set_payment_marker(
        &self,
        entity_id: Uuid,
        paid_on: Option<NaiveDate>,
    ) -> Result<(), AppError>;
}
