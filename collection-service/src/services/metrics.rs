//! Prometheus metrics for collection-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "collection_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Payment counter by provider and terminal state.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collection_payments_total",
        "Payments reaching a terminal state",
        &["provider", "state"]
    )
    .expect("Failed to register payments_total")
});

/// Webhook event counter by provider and apply result.
pub static WEBHOOK_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collection_webhook_events_total",
        "Webhook events by apply result",
        &["provider", "result"] // applied, already_applied, rejected, invalid_signature
    )
    .expect("Failed to register webhook_events_total")
});

/// Invoice counter by status at creation/settlement.
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collection_invoices_total",
        "Invoices by status",
        &["status"]
    )
    .expect("Failed to register invoices_total")
});

/// Refund counter by provider and outcome.
pub static REFUNDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collection_refunds_total",
        "Refunds by outcome",
        &["provider", "state"]
    )
    .expect("Failed to register refunds_total")
});

/// Captures the gateway confirmed but we failed to record. Anything above
/// zero pages the on-call: money has moved that the ledger does not show.
pub static UNRECORDED_CAPTURE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "collection_unrecorded_capture_total",
        "Gateway-confirmed captures whose local transaction failed",
        &["provider"]
    )
    .expect("Failed to register unrecorded_capture_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&WEBHOOK_EVENTS_TOTAL);
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&REFUNDS_TOTAL);
    Lazy::force(&UNRECORDED_CAPTURE_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
