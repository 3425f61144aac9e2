//! Assignment rule engine.
//!
//! First-match-wins evaluation of a priority-ordered rule snapshot against a
//! canonical invoice. The matching functions are pure; callers (or the
//! [`RuleEngine`] wrapper) load the active rule snapshot and persist the
//! returned assignment.

use crate::models::{AssignmentRule, CreateInvoiceRecord, ModuleType, RuleKind};
use crate::services::metrics::RULE_MATCHES_TOTAL;
use crate::services::store::RuleStore;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

/// Assignment decision across all three rule kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub user_id: Option<Uuid>,
    pub module: Option<ModuleType>,
    pub farm_id: Option<Uuid>,
}

impl Assignment {
    pub fn any(&self) -> bool {
        self.user_id.is_some() || self.module.is_some() || self.farm_id.is_some()
    }
}

/// First matching user rule's target, or none for manual triage.
pub fn find_assigned_user(
    record: &CreateInvoiceRecord,
    rules: &[AssignmentRule],
) -> Option<Uuid> {
    first_match(record, rules, RuleKind::User).and_then(|rule| rule.target_user_id)
}

/// First matching module rule's target.
pub fn find_assigned_module(
    record: &CreateInvoiceRecord,
    rules: &[AssignmentRule],
) -> Option<ModuleType> {
    first_match(record, rules, RuleKind::Module).and_then(|rule| rule.target_module())
}

/// First matching farm rule's target.
pub fn find_assigned_farm(
    record: &CreateInvoiceRecord,
    rules: &[AssignmentRule],
) -> Option<Uuid> {
    first_match(record, rules, RuleKind::Farm).and_then(|rule| rule.target_farm_id)
}

/// Evaluate one rule kind over a snapshot.
///
/// The snapshot is re-sorted locally (priority asc, then insertion order:
/// created_utc, then rule id) so evaluation order does not depend on how the
/// caller obtained the slice; the input is never mutated.
fn first_match<'a>(
    record: &CreateInvoiceRecord,
    rules: &'a [AssignmentRule],
    kind: RuleKind,
) -> Option<&'a AssignmentRule> {
    let mut candidates: Vec<&AssignmentRule> = rules
        .iter()
        .filter(|rule| rule.kind() == kind && rule.active && rule.deleted_utc.is_none())
        .collect();
    candidates.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.created_utc.cmp(&b.created_utc))
            .then(a.rule_id.cmp(&b.rule_id))
    });

    let searchable = record.searchable_text().to_lowercase();
    candidates
        .into_iter()
        .find(|rule| rule_matches(rule, record, &searchable))
}

/// Predicate check for one rule. Every predicate the rule specifies must
/// hold; a rule with no predicates never matches.
fn rule_matches(
    rule: &AssignmentRule,
    record: &CreateInvoiceRecord,
    searchable_lower: &str,
) -> bool {
    if !rule.has_predicate() {
        return false;
    }

    if let Some(tax_id) = &rule.match_tax_id {
        let seller_hit = record.seller_tax_id.as_deref() == Some(tax_id.as_str());
        let buyer_hit = record.buyer_tax_id.as_deref() == Some(tax_id.as_str());
        if !seller_hit && !buyer_hit {
            return false;
        }
    }

    if let Some(pattern) = &rule.match_text {
        if !searchable_lower.contains(&pattern.to_lowercase()) {
            return false;
        }
    }

    true
}

/// Store-backed engine shared by ingestion and manual entry.
#[derive(Clone)]
pub struct RuleEngine {
    rules: Arc<dyn RuleStore>,
}

impl RuleEngine {
    pub fn new(rules: Arc<dyn RuleStore>) -> Self {
        Self { rules }
    }

    pub async fn find_user(
        &self,
        record: &CreateInvoiceRecord,
    ) -> Result<Option<Uuid>, AppError> {
        let rules = self.rules.list_active(RuleKind::User).await?;
        Ok(find_assigned_user(record, &rules))
    }

    pub async fn find_module(
        &self,
        record: &CreateInvoiceRecord,
    ) -> Result<Option<ModuleType>, AppError> {
        let rules = self.rules.list_active(RuleKind::Module).await?;
        Ok(find_assigned_module(record, &rules))
    }

    pub async fn find_farm(
        &self,
        record: &CreateInvoiceRecord,
    ) -> Result<Option<Uuid>, AppError> {
        let rules = self.rules.list_active(RuleKind::Farm).await?;
        Ok(find_assigned_farm(record, &rules))
    }

    /// Evaluate all three independent rule kinds.
    pub async fn resolve(&self, record: &CreateInvoiceRecord) -> Result<Assignment, AppError> {
        let assignment = Assignment {
            user_id: self.find_user(record).await?,
            module: self.find_module(record).await?,
            farm_id: self.find_farm(record).await?,
        };

        if assignment.user_id.is_some() {
            RULE_MATCHES_TOTAL.with_label_values(&["user"]).inc();
        }
        if assignment.module.is_some() {
            RULE_MATCHES_TOTAL.with_label_values(&["module"]).inc();
        }
        if assignment.farm_id.is_some() {
            RULE_MATCHES_TOTAL.with_label_values(&["farm"]).inc();
        }

        Ok(assignment)
    }
}
