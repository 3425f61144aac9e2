//! Prometheus metrics for invoice-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Synchronization run counter by trigger and outcome.
pub static SYNC_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_sync_runs_total",
        "Total number of synchronization runs",
        &["trigger", "outcome"]
    )
    .expect("Failed to register sync_runs_total")
});

/// Ingested invoice counter by source.
pub static INVOICES_INGESTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_ingested_total",
        "Total number of ingested invoices",
        &["source"] // external, manual
    )
    .expect("Failed to register invoices_ingested_total")
});

/// Per-invoice ingestion failure counter by reason.
pub static INGEST_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_ingest_failures_total",
        "Total number of per-invoice ingestion failures",
        &["reason"] // fetch, malformed, persist
    )
    .expect("Failed to register ingest_failures_total")
});

/// Rule match counter by rule kind.
pub static RULE_MATCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_rule_matches_total",
        "Total number of assignment rule matches",
        &["kind"] // user, module, farm
    )
    .expect("Failed to register rule_matches_total")
});

/// Payment synchronization counter by direction.
pub static PAYMENT_SYNCS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_payment_syncs_total",
        "Total number of applied payment status synchronizations",
        &["direction"] // to_accounting, from_accounting
    )
    .expect("Failed to register payment_syncs_total")
});

/// Registry call duration histogram.
pub static REGISTRY_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoice_registry_call_duration_seconds",
        "External registry call duration in seconds",
        &["call"], // list_references, fetch_document
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register registry_call_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoice_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SYNC_RUNS_TOTAL);
    Lazy::force(&INVOICES_INGESTED_TOTAL);
    Lazy::force(&INGEST_FAILURES_TOTAL);
    Lazy::force(&RULE_MATCHES_TOTAL);
    Lazy::force(&PAYMENT_SYNCS_TOTAL);
    Lazy::force(&REGISTRY_CALL_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
