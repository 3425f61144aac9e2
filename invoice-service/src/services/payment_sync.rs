//! Bidirectional payment status synchronization.
//!
//! The accounting invoice and the owning module entity each track payment
//! on their own; this component is the only writer of the derived side in
//! either direction. Concurrent triggers on the same invoice serialize on
//! the per-invoice lock; the triggered direction wins and every applied
//! write is audited, so conflicting triggers stay visible in the trail.

use crate::models::{
    Actor, AuditAction, InvoiceRecord, ModuleType, NewAuditEvent, PaymentStatus,
};
use crate::services::audit::AuditLog;
use crate::services::locks::InvoiceLocks;
use crate::services::metrics::PAYMENT_SYNCS_TOTAL;
use crate::services::store::{InvoiceStore, ModuleGateway};
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Payment status derived from a module entity's payment marker.
fn derive_status(marker: Option<NaiveDate>) -> PaymentStatus {
    match marker {
        Some(_) => PaymentStatus::Paid,
        None => PaymentStatus::Unpaid,
    }
}

#[derive(Clone)]
pub struct PaymentSynchronizer {
    invoices: Arc<dyn InvoiceStore>,
    audit: AuditLog,
    gateways: HashMap<ModuleType, Arc<dyn ModuleGateway>>,
    locks: Arc<InvoiceLocks>,
}

impl PaymentSynchronizer {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        audit: AuditLog,
        gateways: Vec<Arc<dyn ModuleGateway>>,
        locks: Arc<InvoiceLocks>,
    ) -> Self {
        let gateways = gateways
            .into_iter()
            .map(|gateway| (gateway.module(), gateway))
            .collect();
        Self {
            invoices,
            audit,
            gateways,
            locks,
        }
    }

    /// Read-only probe: payment status as the linked module entity sees it,
    /// or none when the invoice has no module link.
    pub async fn current_module_status(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<PaymentStatus>, AppError> {
        let invoice = self.load(invoice_id).await?;
        let Some((module, entity_id)) = module_link(&invoice) else {
            return Ok(None);
        };
        let marker = self.gateway(module)?.payment_marker(entity_id).await?;
        Ok(Some(derive_status(marker)))
    }

    /// Module entity changed: propagate its payment marker onto the
    /// accounting invoice. No-op (and no audit event) when nothing changes.
    pub async fn sync_to_accounting(
        &self,
        invoice_id: Uuid,
        actor: Actor,
    ) -> Result<(), AppError> {
        let lock = self.locks.for_invoice(invoice_id);
        let _guard = lock.lock().await;

        let invoice = self.load(invoice_id).await?;
        let Some((module, entity_id)) = module_link(&invoice) else {
            tracing::debug!(invoice_id = %invoice_id, "No module link, payment sync skipped");
            return Ok(());
        };

        let marker = self.gateway(module)?.payment_marker(entity_id).await?;
        let derived = derive_status(marker);
        if derived == invoice.payment_status() {
            return Ok(());
        }

        self.audit
            .append(NewAuditEvent {
                invoice_id,
                action: AuditAction::PaymentSynced,
                previous_status: Some(invoice.payment_status.clone()),
                new_status: Some(derived.as_str().to_string()),
                actor,
                comment: Some(format!(
                    "payment marker of {} entity {} applied to accounting",
                    module.as_str(),
                    entity_id
                )),
            })
            .await?;
        self.invoices
            .update_payment_status(invoice_id, derived)
            .await?;

        PAYMENT_SYNCS_TOTAL
            .with_label_values(&["to_accounting"])
            .inc();
        tracing::info!(
            invoice_id = %invoice_id,
            module = module.as_str(),
            payment_status = derived.as_str(),
            "Payment status synced to accounting"
        );
        Ok(())
    }

    /// Accounting invoice changed: record the new status and propagate it to
    /// the linked module entity's payment marker.
    pub async fn sync_from_accounting(
        &self,
        invoice_id: Uuid,
        new_status: PaymentStatus,
        actor: Actor,
    ) -> Result<(), AppError> {
        let lock = self.locks.for_invoice(invoice_id);
        let _guard = lock.lock().await;

        let invoice = self.load(invoice_id).await?;
        if new_status == invoice.payment_status() {
            return Ok(());
        }

        self.audit
            .append(NewAuditEvent {
                invoice_id,
                action: AuditAction::PaymentSynced,
                previous_status: Some(invoice.payment_status.clone()),
                new_status: Some(new_status.as_str().to_string()),
                actor,
                comment: Some("accounting payment status propagated to module".to_string()),
            })
            .await?;
        self.invoices
            .update_payment_status(invoice_id, new_status)
            .await?;

        if let Some((module, entity_id)) = module_link(&invoice) {
            // A single payment date cannot express a partial payment, so
            // anything short of Paid clears the module-side marker.
            let marker = match new_status {
                PaymentStatus::Paid => Some(Utc::now().date_naive()),
                PaymentStatus::Unpaid | PaymentStatus::PartiallyPaid => None,
            };
            let gateway = self.gateway(module)?;
            let current = gateway.payment_marker(entity_id).await?;
            if current.is_some() != marker.is_some() {
                gateway.set_payment_marker(entity_id, marker).await?;
            }
        }

        PAYMENT_SYNCS_TOTAL
            .with_label_values(&["from_accounting"])
            .inc();
        tracing::info!(
            invoice_id = %invoice_id,
            payment_status = new_status.as_str(),
            "Payment status synced from accounting"
        );
        Ok(())
    }

    async fn load(&self, invoice_id: Uuid) -> Result<InvoiceRecord, AppError> {
        self.invoices
            .get(invoice_id)
            .await?
            .filter(|invoice| invoice.deleted_utc.is_none())
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice {} not found", invoice_id)))
    }

    fn gateway(&self, module: ModuleType) -> Result<&Arc<dyn ModuleGateway>, AppError> {
        self.gateways.get(&module).ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "no module gateway registered for {}",
                module.as_str()
            ))
        })
    }
}

fn module_link(invoice: &InvoiceRecord) -> Option<(ModuleType, Uuid)> {
    match (invoice.assigned_module(), invoice.module_entity_id) {
        (Some(module), Some(entity_id)) => Some((module, entity_id)),
        _ => None,
    }
}
