//! Manual invoice entry and status transitions.
//!
//! Manual entry reuses the same rule engine as automatic ingestion, but a
//! duplicate external reference is a synchronous rejection here where the
//! synchronizer silently skips it.

use crate::models::{
    Actor, AuditAction, CreateInvoiceRecord, InvoiceDirection, InvoiceRecord, InvoiceSource,
    InvoiceStatus, NewAuditEvent,
};
use crate::services::assignment::RuleEngine;
use crate::services::audit::AuditLog;
use crate::services::locks::InvoiceLocks;
use crate::services::metrics::INVOICES_INGESTED_TOTAL;
use crate::services::normalizer::validate_nip;
use crate::services::store::InvoiceStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// User-submitted invoice.
#[derive(Debug, Clone, Validate)]
pub struct ManualInvoiceInput {
    /// Optional KSeF reference when the user transcribes a registry invoice.
    pub external_reference: Option<String>,
    pub direction: InvoiceDirection,
    #[validate(length(min = 1, message = "seller name is required"))]
    pub seller_name: String,
    pub seller_tax_id: Option<String>,
    #[validate(length(min = 1, message = "buyer name is required"))]
    pub buyer_name: String,
    pub buyer_tax_id: Option<String>,
    #[validate(length(min = 1, message = "invoice number is required"))]
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub net_amount: Decimal,
    pub tax_amount: Decimal,
    pub gross_amount: Decimal,
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct InvoiceService {
    invoices: Arc<dyn InvoiceStore>,
    engine: RuleEngine,
    audit: AuditLog,
    locks: Arc<InvoiceLocks>,
}

impl InvoiceService {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        engine: RuleEngine,
        audit: AuditLog,
        locks: Arc<InvoiceLocks>,
    ) -> Self {
        Self {
            invoices,
            engine,
            audit,
            locks,
        }
    }

    /// Create a manually entered invoice. Validation failures and duplicate
    /// references surface synchronously with a field-level message.
    pub async fn create_manual(
        &self,
        input: ManualInvoiceInput,
        actor: Actor,
    ) -> Result<InvoiceRecord, AppError> {
        input.validate()?;

        if let Some(nip) = input.seller_tax_id.as_deref() {
            if !validate_nip(nip) {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "seller_tax_id: invalid NIP checksum"
                )));
            }
        }
        if let Some(nip) = input.buyer_tax_id.as_deref() {
            if !validate_nip(nip) {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "buyer_tax_id: invalid NIP checksum"
                )));
            }
        }
        if (input.gross_amount - (input.net_amount + input.tax_amount)).abs()
            >= Decimal::new(1, 2)
        {
            return Err(AppError::MalformedDocument(format!(
                "gross_amount: {} does not equal net {} + tax {}",
                input.gross_amount, input.net_amount, input.tax_amount
            )));
        }

        if let Some(reference) = input.external_reference.as_deref() {
            if self
                .invoices
                .find_by_external_reference(reference)
                .await?
                .is_some()
            {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "external_reference: invoice {} already exists",
                    reference
                )));
            }
        }

        let mut record = CreateInvoiceRecord {
            external_reference: input.external_reference,
            direction: input.direction,
            source: InvoiceSource::Manual,
            seller_name: input.seller_name,
            seller_tax_id: input.seller_tax_id,
            buyer_name: input.buyer_name,
            buyer_tax_id: input.buyer_tax_id,
            invoice_number: input.invoice_number,
            issue_date: input.issue_date,
            net_amount: input.net_amount,
            tax_amount: input.tax_amount,
            gross_amount: input.gross_amount,
            currency: input.currency,
            description: input.description,
            assigned_user_id: None,
            assigned_module: None,
            assigned_farm_id: None,
            module_entity_id: None,
        };

        let assignment = self.engine.resolve(&record).await?;
        record.assigned_user_id = assignment.user_id;
        record.assigned_module = assignment.module;
        record.assigned_farm_id = assignment.farm_id;

        let invoice = self.invoices.insert(record).await?;

        let lock = self.locks.for_invoice(invoice.invoice_id);
        let _guard = lock.lock().await;

        self.audit
            .append(NewAuditEvent {
                invoice_id: invoice.invoice_id,
                action: AuditAction::ManualEntry,
                previous_status: None,
                new_status: Some(InvoiceStatus::New.as_str().to_string()),
                actor: actor.clone(),
                comment: Some(format!("invoice {} entered manually", invoice.invoice_number)),
            })
            .await?;
        if assignment.any() {
            self.audit
                .append(NewAuditEvent {
                    invoice_id: invoice.invoice_id,
                    action: AuditAction::Assigned,
                    previous_status: Some(InvoiceStatus::New.as_str().to_string()),
                    new_status: Some(InvoiceStatus::Assigned.as_str().to_string()),
                    actor,
                    comment: None,
                })
                .await?;
        }

        INVOICES_INGESTED_TOTAL.with_label_values(&["manual"]).inc();
        tracing::info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            "Manual invoice created"
        );
        Ok(invoice)
    }

    /// Change the processing status of an invoice.
    ///
    /// The audit event is appended before the status write: a failed append
    /// aborts the whole operation and leaves the status untouched.
    pub async fn change_status(
        &self,
        invoice_id: Uuid,
        new_status: InvoiceStatus,
        actor: Actor,
        comment: Option<String>,
    ) -> Result<(), AppError> {
        let lock = self.locks.for_invoice(invoice_id);
        let _guard = lock.lock().await;

        let invoice = self.load(invoice_id).await?;
        let current = invoice.status();
        if current == new_status {
            return Ok(());
        }
        if !current.can_transition_to(new_status) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "cannot change status from {} to {}",
                current.as_str(),
                new_status.as_str()
            )));
        }

        self.audit
            .append(NewAuditEvent {
                invoice_id,
                action: AuditAction::StatusChanged,
                previous_status: Some(current.as_str().to_string()),
                new_status: Some(new_status.as_str().to_string()),
                actor,
                comment,
            })
            .await?;
        self.invoices.update_status(invoice_id, new_status).await?;

        Ok(())
    }

    pub async fn get(&self, invoice_id: Uuid) -> Result<InvoiceRecord, AppError> {
        self.load(invoice_id).await
    }

    /// Invoices are soft-deleted only.
    pub async fn soft_delete(&self, invoice_id: Uuid) -> Result<(), AppError> {
        let lock = self.locks.for_invoice(invoice_id);
        let _guard = lock.lock().await;
        self.load(invoice_id).await?;
        self.invoices.soft_delete(invoice_id).await
    }

    /// The rule engine, shared with ingestion and exposed for callers that
    /// want a dry-run assignment.
    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    async fn load(&self, invoice_id: Uuid) -> Result<InvoiceRecord, AppError> {
        self.invoices
            .get(invoice_id)
            .await?
            .filter(|invoice| invoice.deleted_utc.is_none())
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice {} not found", invoice_id)))
    }
}
