//! Prometheus metrics for identity-store.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "identity_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Transaction outcomes.
pub static TRANSACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_transactions_total",
        "Total number of transactions by outcome",
        &["status"]  // committed, rolled_back, rollback_failed, commit_failed, begin_failed
    )
    .expect("Failed to register transactions_total")
});

/// Users provisioned, by identity type.
pub static USERS_PROVISIONED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_users_provisioned_total",
        "Total number of users created with an identity",
        &["identity_type"]
    )
    .expect("Failed to register users_provisioned")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_errors_total",
        "Total number of errors by type",
        &["operation", "error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&TRANSACTIONS_TOTAL);
    Lazy::force(&USERS_PROVISIONED);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
