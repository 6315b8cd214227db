//! Prometheus metrics for finance-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for HTTP requests by method, route and status.
pub static HTTP_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS")
});

/// Histogram for HTTP request duration by method and route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "finance_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION")
});

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "finance_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Histogram for aggregator call duration.
pub static AGGREGATOR_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "finance_aggregator_call_duration_seconds",
        "Aggregator API call duration in seconds",
        &["operation"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register AGGREGATOR_CALL_DURATION")
});

/// Counter for sync runs by kind and outcome.
pub static SYNC_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_sync_runs_total",
        "Total number of sync runs",
        &["kind", "status"]
    )
    .expect("Failed to register SYNC_RUNS")
});

/// Counter for institutions that failed during a sync.
pub static INSTITUTION_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_institution_failures_total",
        "Total number of institution sync failures",
        &["stage"]
    )
    .expect("Failed to register INSTITUTION_FAILURES")
});

/// Counter for balance snapshots written by source.
pub static SNAPSHOTS_WRITTEN: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_snapshots_written_total",
        "Total number of balance snapshots written",
        &["source"]
    )
    .expect("Failed to register SNAPSHOTS_WRITTEN")
});

/// Counter for imported transactions by classification.
pub static TRANSACTIONS_IMPORTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_transactions_imported_total",
        "Total number of imported transactions",
        &["kind"]
    )
    .expect("Failed to register TRANSACTIONS_IMPORTED")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&AGGREGATOR_CALL_DURATION);
    Lazy::force(&SYNC_RUNS);
    Lazy::force(&INSTITUTION_FAILURES);
    Lazy::force(&SNAPSHOTS_WRITTEN);
    Lazy::force(&TRANSACTIONS_IMPORTED);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a completed HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

/// Record a sync run outcome.
pub fn record_sync_run(kind: &str, status: &str) {
    SYNC_RUNS.with_label_values(&[kind, status]).inc();
}

/// Record an institution failure during the given stage.
pub fn record_institution_failure(stage: &str) {
    INSTITUTION_FAILURES.with_label_values(&[stage]).inc();
}

/// Record a snapshot write.
pub fn record_snapshot(source: &str) {
    SNAPSHOTS_WRITTEN.with_label_values(&[source]).inc();
}

/// Record an imported transaction.
pub fn record_transaction_import(kind: &str) {
    TRANSACTIONS_IMPORTED.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_metrics_show_up_in_output() {
        init_metrics();
        record_sync_run("balances", "success");
        record_snapshot("forward_fill");
        let output = get_metrics();
        assert!(output.contains("finance_sync_runs_total"));
        assert!(output.contains("finance_snapshots_written_total"));
    }
}
