//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bootstrap_stage_duration_seconds` (histogram): time spent per pipeline stage
//! - `bootstrap_packages_installed_total` (counter): packages installed
//! - `gateway_requests_total` (counter): gateway requests by route, status
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_stage(stage: &'static str, started: Instant) {
    ::metrics::histogram!("bootstrap_stage_duration_seconds", "stage" => stage)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_package_installed() {
    ::metrics::counter!("bootstrap_packages_installed_total").increment(1);
}

pub fn record_request(route: &'static str, status: u16) {
    ::metrics::counter!(
        "gateway_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
}
