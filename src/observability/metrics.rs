//! Metrics collection and exposition.
//!
//! # Metrics
//! - `supervisor_worker_spawns_total` (counter): worker processes started
//! - `supervisor_worker_crashes_total` (counter): worker exits outside shutdown
//! - `supervisor_forced_kills_total` (counter): workers killed after ignoring stop
//! - `supervisor_exit_causes_total` (counter): exit sequences by cause
//! - `supervisor_restart_budget_remaining` (gauge): crashes left before giving up
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Exporter is optional and only bound when configured

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_worker_spawn() {
    metrics::counter!("supervisor_worker_spawns_total").increment(1);
}

pub fn record_worker_crash() {
    metrics::counter!("supervisor_worker_crashes_total").increment(1);
}

pub fn record_forced_kill() {
    metrics::counter!("supervisor_forced_kills_total").increment(1);
}

pub fn record_exit_cause(cause: &'static str) {
    metrics::counter!("supervisor_exit_causes_total", "cause" => cause).increment(1);
}

pub fn record_restart_budget(remaining: u32) {
    metrics::gauge!("supervisor_restart_budget_remaining").set(f64::from(remaining));
}
