//! Assignment rule model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ModuleType;

/// Which assignment decision a rule contributes to. The three kinds form
/// independently ordered rule lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    User,
    Module,
    Farm,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::User => "user",
            RuleKind::Module => "module",
            RuleKind::Farm => "farm",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "module" => RuleKind::Module,
            "farm" => RuleKind::Farm,
            _ => RuleKind::User,
        }
    }
}

/// A single assignment rule.
///
/// Lower priority evaluates first; ties are broken by insertion order.
/// Only `active` rules with no `deleted_utc` participate in evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssignmentRule {
    pub rule_id: Uuid,
    pub kind: String,
    pub priority: i32,
    pub active: bool,
    /// Matches on equality against seller or buyer tax id.
    pub match_tax_id: Option<String>,
    /// Matches as a case-insensitive substring of the record's searchable text.
    pub match_text: Option<String>,
    pub target_user_id: Option<Uuid>,
    pub target_module: Option<String>,
    pub target_farm_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl AssignmentRule {
    pub fn kind(&self) -> RuleKind {
        RuleKind::from_string(&self.kind)
    }

    pub fn target_module(&self) -> Option<ModuleType> {
        self.target_module
            .as_deref()
            .and_then(ModuleType::from_string)
    }

    /// A rule with no predicate set never matches.
    pub fn has_predicate(&self) -> bool {
        self.match_tax_id.is_some() || self.match_text.is_some()
    }
}

/// Input for creating an assignment rule. Priority is assigned by the store
/// as `max(priority) + 1` over non-deleted rules of the same kind.
#[derive(Debug, Clone)]
pub struct CreateAssignmentRule {
    pub kind: RuleKind,
    pub match_tax_id: Option<String>,
    pub match_text: Option<String>,
    pub target_user_id: Option<Uuid>,
    pub target_module: Option<ModuleType>,
    pub target_farm_id: Option<Uuid>,
}
