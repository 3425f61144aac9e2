//! Append-only audit trail.

use crate::models::{AuditEvent, NewAuditEvent};
use crate::services::store::AuditStore;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

/// Write-only audit log over the audit store.
///
/// An append failure must abort the operation that triggered it: a state
/// change without its audit event is a correctness bug, so callers propagate
/// the error instead of logging it away.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AppError> {
        let appended = self.store.append(event).await?;
        tracing::debug!(
            invoice_id = %appended.invoice_id,
            action = %appended.action,
            actor = %appended.actor_name,
            "Audit event appended"
        );
        Ok(appended)
    }

    /// Chronological history of one invoice.
    pub async fn history_for(&self, invoice_id: Uuid) -> Result<Vec<AuditEvent>, AppError> {
        self.store.history_for(invoice_id).await
    }

    pub async fn events_by_actor(
        &self,
        actor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, AppError> {
        self.store.by_actor(actor_id, from, to).await
    }
}
