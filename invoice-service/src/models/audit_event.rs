//! Append-only audit trail entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What happened to an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Ingested,
    Assigned,
    StatusChanged,
    PaymentSynced,
    ManualEntry,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Ingested => "ingested",
            AuditAction::Assigned => "assigned",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::PaymentSynced => "payment_synced",
            AuditAction::ManualEntry => "manual_entry",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "assigned" => AuditAction::Assigned,
            "status_changed" => AuditAction::StatusChanged,
            "payment_synced" => AuditAction::PaymentSynced,
            "manual_entry" => AuditAction::ManualEntry,
            _ => AuditAction::Ingested,
        }
    }
}

/// Who performed an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub name: String,
}

impl Actor {
    pub fn user(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }

    /// The background synchronizer acting on its own schedule.
    pub fn synchronizer() -> Self {
        Self {
            id: None,
            name: "synchronizer".to_string(),
        }
    }
}

/// One immutable audit trail entry. Created once, never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub invoice_id: Uuid,
    pub action: String,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
    pub actor_id: Option<Uuid>,
    pub actor_name: String,
    pub comment: Option<String>,
    pub occurred_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn action(&self) -> AuditAction {
        AuditAction::from_string(&self.action)
    }
}

/// Input for appending an audit event.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub invoice_id: Uuid,
    pub action: AuditAction,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
    pub actor: Actor,
    pub comment: Option<String>,
}
