//! Per-invoice-id lock table.
//!
//! Persist+audit during ingestion and payment synchronization on the same
//! invoice must not interleave. Locks are acquired only around the local
//! persist+audit step, never across a registry call.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InvoiceLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl InvoiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for one invoice id. Entries are kept for the process
    /// lifetime; the set of concurrently touched invoices stays small.
    pub fn for_invoice(&self, invoice_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(invoice_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
