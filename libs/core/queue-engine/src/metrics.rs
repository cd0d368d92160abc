//! Prometheus metrics exposition, grounded in the same
//! `metrics` + `metrics-exporter-prometheus` pairing the teacher's
//! `stream_worker::metrics` module uses: install a global recorder once,
//! render its handle on demand for the `/metrics` endpoint.
//!
//! The five series here are the ones named in `spec.md` §6; each has a
//! single recorder function, called from the component that actually
//! observes the value (`claim`/`status` for `queue_records`, `health`
//! for the store/overall signals). A few supplementary counters
//! (`queue_records_completed_total`, `_failed_total`,
//! `_orphans_reclaimed_total`) live alongside them for operator
//! dashboards; they're additions, not replacements for the required set.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Call once at process startup,
/// before any `metrics::counter!`/`gauge!` call.
pub fn init_metrics() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    let _ = HANDLE.set(handle);
}

/// Render the current metrics snapshot as Prometheus text exposition
/// format. Returns an empty string if `init_metrics` was never called
/// (e.g. in unit tests that don't exercise the HTTP surface).
pub fn render() -> String {
    HANDLE.get().map(|h| h.render()).unwrap_or_default()
}

/// `queue_records{flow,status}` gauge: current count of records in
/// `status` for `flow_name`. Called from [`crate::claim`] (the batch it
/// just claimed) and [`crate::status`] (the authoritative whole-table
/// snapshot).
pub fn set_queue_records(flow_name: &str, status: &str, count: u64) {
    metrics::gauge!("queue_records", "flow" => flow_name.to_string(), "status" => status.to_string())
        .set(count as f64);
}

/// `store_response_time_ms{database}` gauge.
pub fn set_store_response_time_ms(database: &str, ms: u64) {
    metrics::gauge!("store_response_time_ms", "database" => database.to_string()).set(ms as f64);
}

/// `store_health{database}` gauge (1 healthy, 0 unhealthy).
pub fn set_store_health(database: &str, healthy: bool) {
    metrics::gauge!("store_health", "database" => database.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

/// `overall_health` gauge: 1.0 healthy, 0.5 degraded, 0.0 unhealthy.
pub fn set_overall_health(value: f64) {
    metrics::gauge!("overall_health").set(value);
}

/// `health_checks_total` counter, incremented once per aggregated health probe.
pub fn record_health_check() {
    metrics::counter!("health_checks_total").increment(1);
}

/// A record finalized as completed.
pub fn record_completed() {
    metrics::counter!("queue_records_completed_total").increment(1);
}

/// A record finalized as failed.
pub fn record_failed() {
    metrics::counter!("queue_records_failed_total").increment(1);
}

/// Rows reclaimed by an orphan sweep.
pub fn record_orphans_reclaimed(count: u64) {
    metrics::counter!("queue_orphans_reclaimed_total").increment(count);
}
