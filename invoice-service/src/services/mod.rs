//! Services module for invoice-service.

pub mod assignment;
pub mod audit;
pub mod database;
pub mod invoices;
pub mod locks;
pub mod metrics;
pub mod normalizer;
pub mod payment_sync;
pub mod registry;
pub mod store;
pub mod sync_job;

pub use assignment::{Assignment, RuleEngine};
pub use audit::AuditLog;
pub use database::{Database, PgModuleGateway};
pub use invoices::{InvoiceService, ManualInvoiceInput};
pub use locks::InvoiceLocks;
pub use metrics::{get_metrics, init_metrics};
pub use payment_sync::PaymentSynchronizer;
pub use registry::{InvoiceReference, KsefClient, RegistryClient};
pub use sync_job::{SyncScheduler, Synchronizer};
