//! Synchronization job: the orchestrator that pulls invoices from the
//! registry, normalizes and assigns them, and records a checkpoint per run.
//!
//! One run at a time, whether the timer or an on-demand trigger started it;
//! overlap is excluded by an atomic run-in-progress flag. Fetching and
//! normalizing individual invoices is concurrent, persistence and audit are
//! serialized per invoice id.

use crate::models::{
    Actor, AuditAction, InvoiceStatus, NewAuditEvent, SyncRun, SyncRunStatus, SyncTrigger,
};
use crate::services::assignment::RuleEngine;
use crate::services::audit::AuditLog;
use crate::services::locks::InvoiceLocks;
use crate::services::metrics::{INGEST_FAILURES_TOTAL, INVOICES_INGESTED_TOTAL, SYNC_RUNS_TOTAL};
use crate::services::normalizer::{self, NormalizedInvoice};
use crate::services::registry::{InvoiceReference, RegistryClient};
use crate::services::store::{InvoiceStore, SyncRunStore};
use backoff::ExponentialBackoff;
use backoff::future::retry;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use futures::stream;
use service_core::error::AppError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Fetch window start when no successful run exists yet: before the
/// exchange went live, so the first run fetches everything.
pub fn sync_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

/// Resets the run-in-progress flag on every exit path.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Synchronizer {
    registry: Arc<dyn RegistryClient>,
    invoices: Arc<dyn InvoiceStore>,
    runs: Arc<dyn SyncRunStore>,
    engine: RuleEngine,
    audit: AuditLog,
    locks: Arc<InvoiceLocks>,
    /// The farm's own NIP, used to decide invoice direction.
    own_tax_id: String,
    concurrency: usize,
    list_retry_max_elapsed: Duration,
    running: AtomicBool,
}

impl Synchronizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        invoices: Arc<dyn InvoiceStore>,
        runs: Arc<dyn SyncRunStore>,
        engine: RuleEngine,
        audit: AuditLog,
        locks: Arc<InvoiceLocks>,
        own_tax_id: String,
        concurrency: usize,
        list_retry_max_elapsed: Duration,
    ) -> Self {
        Self {
            registry,
            invoices,
            runs,
            engine,
            audit,
            locks,
            own_tax_id,
            concurrency: concurrency.max(1),
            list_retry_max_elapsed,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Recent synchronization checkpoints, newest first.
    pub async fn history(&self, count: i64) -> Result<Vec<SyncRun>, AppError> {
        self.runs.list(count).await
    }

    /// Execute one synchronization run.
    ///
    /// Returns the closed checkpoint. A registry outage before any progress
    /// closes the run as `Failure`; per-invoice failures and cancellation
    /// close it as `PartialFailure` with the counts accumulated so far.
    pub async fn run(
        &self,
        trigger: SyncTrigger,
        cancel: &CancellationToken,
    ) -> Result<SyncRun, AppError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "a synchronization run is already in progress"
            )));
        }
        let _guard = RunningGuard(&self.running);

        let since = self
            .runs
            .last_successful_end()
            .await?
            .unwrap_or_else(sync_epoch);
        let run = self.runs.open(trigger).await?;
        tracing::info!(
            run_id = %run.run_id,
            trigger = trigger.as_str(),
            since = %since,
            "Synchronization run started"
        );

        let references = match self.list_references_with_retry(since).await {
            Ok(references) => references,
            Err(e) => {
                tracing::error!(run_id = %run.run_id, error = %e, "Reference listing failed, aborting run");
                let closed = self
                    .runs
                    .close(run.run_id, SyncRunStatus::Failure, 0, 0, Some(e.to_string()))
                    .await?;
                SYNC_RUNS_TOTAL
                    .with_label_values(&[trigger.as_str(), "failure"])
                    .inc();
                return Ok(closed);
            }
        };

        let total = references.len();
        let mut fetched_count = 0i32;
        let mut failed_count = 0i32;
        let mut cancelled = false;

        let registry = Arc::clone(&self.registry);
        let mut documents = stream::iter(references.into_iter().map(|reference| {
            let registry = Arc::clone(&registry);
            async move {
                let outcome = match registry.fetch_document(&reference).await {
                    Ok(raw) => normalizer::normalize(&raw),
                    Err(e) => Err(e),
                };
                (reference, outcome)
            }
        }))
        .buffer_unordered(self.concurrency);

        loop {
            // Cancellation is observed between invoices, never mid-invoice.
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = documents.next() => next,
            };
            let Some((reference, outcome)) = next else {
                break;
            };

            match outcome {
                Ok(normalized) => match self.ingest(&reference, normalized).await {
                    Ok(_) => fetched_count += 1,
                    Err(e) => {
                        failed_count += 1;
                        INGEST_FAILURES_TOTAL.with_label_values(&["persist"]).inc();
                        tracing::warn!(
                            reference = %reference.reference_number,
                            error = %e,
                            "Failed to persist invoice"
                        );
                    }
                },
                Err(e) => {
                    failed_count += 1;
                    let reason = match &e {
                        AppError::MalformedDocument(_) => "malformed",
                        _ => "fetch",
                    };
                    INGEST_FAILURES_TOTAL.with_label_values(&[reason]).inc();
                    tracing::warn!(
                        reference = %reference.reference_number,
                        error = %e,
                        "Failed to fetch or normalize invoice"
                    );
                }
            }
        }

        let status = if cancelled || failed_count > 0 {
            SyncRunStatus::PartialFailure
        } else {
            SyncRunStatus::Success
        };
        let error_message = cancelled.then(|| "run cancelled before completion".to_string());
        let closed = self
            .runs
            .close(run.run_id, status, fetched_count, failed_count, error_message)
            .await?;

        SYNC_RUNS_TOTAL
            .with_label_values(&[trigger.as_str(), status.as_str()])
            .inc();
        tracing::info!(
            run_id = %closed.run_id,
            outcome = status.as_str(),
            referenced = total,
            fetched = fetched_count,
            failed = failed_count,
            "Synchronization run finished"
        );
        Ok(closed)
    }

    /// Persist one normalized invoice: dedup on the external reference,
    /// assign, insert, audit. A duplicate is a silent skip.
    async fn ingest(
        &self,
        reference: &InvoiceReference,
        normalized: NormalizedInvoice,
    ) -> Result<bool, AppError> {
        if self
            .invoices
            .find_by_external_reference(&reference.reference_number)
            .await?
            .is_some()
        {
            tracing::debug!(
                reference = %reference.reference_number,
                "Invoice already ingested, skipping"
            );
            return Ok(false);
        }

        let mut record =
            normalized.into_create_record(reference.reference_number.clone(), &self.own_tax_id);
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
                action: AuditAction::Ingested,
                previous_status: None,
                new_status: Some(InvoiceStatus::New.as_str().to_string()),
                actor: Actor::synchronizer(),
                comment: Some(format!("fetched from KSeF as {}", reference.reference_number)),
            })
            .await?;
        if assignment.any() {
            self.audit
                .append(NewAuditEvent {
                    invoice_id: invoice.invoice_id,
                    action: AuditAction::Assigned,
                    previous_status: Some(InvoiceStatus::New.as_str().to_string()),
                    new_status: Some(InvoiceStatus::Assigned.as_str().to_string()),
                    actor: Actor::synchronizer(),
                    comment: None,
                })
                .await?;
        }

        INVOICES_INGESTED_TOTAL
            .with_label_values(&["external"])
            .inc();
        Ok(true)
    }

    /// The reference listing is the one call whose failure aborts the run,
    /// so transient registry errors are retried with exponential backoff
    /// before giving up.
    async fn list_references_with_retry(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InvoiceReference>, AppError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.list_retry_max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            self.registry
                .list_references_since(since)
                .await
                .map_err(|e| match e {
                    AppError::RegistryUnavailable(_) => backoff::Error::transient(e),
                    other => backoff::Error::permanent(other),
                })
        })
        .await
    }
}

/// Timer loop driving scheduled runs, with a non-blocking manual trigger.
pub struct SyncScheduler {
    synchronizer: Arc<Synchronizer>,
    interval: Duration,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(
        synchronizer: Arc<Synchronizer>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            synchronizer,
            interval,
            cancel,
        }
    }

    /// Fire a manual run without blocking for its completion. Overlap with
    /// an active run is rejected instead of queued.
    pub fn trigger_manual(&self) -> Result<(), AppError> {
        if self.synchronizer.is_running() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "a synchronization run is already in progress"
            )));
        }

        let synchronizer = Arc::clone(&self.synchronizer);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            match synchronizer.run(SyncTrigger::Manual, &cancel).await {
                Ok(run) => {
                    tracing::info!(run_id = %run.run_id, outcome = %run.status, "Manual run finished");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Manual run did not start");
                }
            }
        });
        Ok(())
    }

    /// Run the scheduler until cancelled. The first tick fires immediately,
    /// catching up after a restart.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Synchronization scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.synchronizer.run(SyncTrigger::Scheduled, &self.cancel).await {
                        Ok(run) => {
                            tracing::debug!(run_id = %run.run_id, outcome = %run.status, "Scheduled run finished");
                        }
                        Err(AppError::Conflict(_)) => {
                            tracing::debug!("Run already in progress, skipping scheduled tick");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Scheduled run failed");
                        }
                    }
                }
            }
        }
    }
}
