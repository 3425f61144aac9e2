//! Domain models for invoice-service.

mod assignment_rule;
mod audit_event;
mod invoice;
mod sync_run;

pub use assignment_rule::{AssignmentRule, CreateAssignmentRule, RuleKind};
pub use audit_event::{Actor, AuditAction, AuditEvent, NewAuditEvent};
pub use invoice::{
    CreateInvoiceRecord, InvoiceDirection, InvoiceRecord, InvoiceSource, InvoiceStatus, ModuleType,
    PaymentStatus,
};
pub use sync_run::{SyncRun, SyncRunStatus, SyncTrigger};
