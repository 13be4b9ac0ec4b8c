//! Metrics collection and exposition.
//!
//! # Metrics
//! - `orchestrator_isolation_checks_total` (counter): pre-start verifications by `result`
//! - `orchestrator_isolation_violations_total` (counter): blocking findings by `violation_type`
//! - `orchestrator_boot_instances_total` (counter): boot starts by `outcome`
//! - `orchestrator_boot_duration_seconds` (histogram): whole boot sequence
//! - `orchestrator_schedule_transitions_total` (counter): routing flips by `direction`
//! - `orchestrator_schedule_evaluations_total` (counter): completed ticks
//! - `orchestrator_active_routings` (gauge): routings active after the last tick

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to install Prometheus exporter on {addr}: {reason}")]
pub struct MetricsError {
    pub addr: SocketAddr,
    pub reason: String,
}

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError {
            addr,
            reason: e.to_string(),
        })?;

    tracing::info!(%addr, "Prometheus metrics endpoint listening");
    Ok(())
}

pub fn record_isolation_check(passed: bool) {
    let result = if passed { "passed" } else { "failed" };
    counter!("orchestrator_isolation_checks_total", "result" => result).increment(1);
}

pub fn record_isolation_violation(violation_type: &'static str) {
    counter!("orchestrator_isolation_violations_total", "violation_type" => violation_type)
        .increment(1);
}

pub fn record_boot_instance(started: bool) {
    let outcome = if started { "started" } else { "failed" };
    counter!("orchestrator_boot_instances_total", "outcome" => outcome).increment(1);
}

pub fn record_boot_duration(elapsed: Duration) {
    histogram!("orchestrator_boot_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_schedule_transition(activated: bool) {
    let direction = if activated { "activated" } else { "deactivated" };
    counter!("orchestrator_schedule_transitions_total", "direction" => direction).increment(1);
}

pub fn record_schedule_evaluation() {
    counter!("orchestrator_schedule_evaluations_total").increment(1);
}

pub fn set_active_routings(count: usize) {
    gauge!("orchestrator_active_routings").set(count as f64);
}
