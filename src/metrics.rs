//! Prometheus-compatible metrics for StormWeave.
//!
//! Records settlement, throughput and buffering metrics. Use
//! [`install_prometheus_recorder`] at startup to expose them for scraping;
//! without a recorder every call here is a no-op.
//!
//! - **Settlement:** `stormweave_acks_total` / `stormweave_fails_total` count
//!   source deliveries settled by the ack tracker.
//! - **Throughput:** [`record_emitted`] feeds `stormweave_emitted_total` per
//!   stage and stream.
//! - **Backlog:** `stormweave_in_flight` and `stormweave_join_pending` gauges
//!   show how much work is waiting on downstream stages.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Installs the Prometheus recorder and serves metrics on the given address.
pub fn install_prometheus_recorder(addr: std::net::SocketAddr) -> Result<(), BuildError> {
  PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Records a delivery whose whole lineage completed.
pub fn record_ack() {
  counter!("stormweave_acks_total").increment(1);
}

/// Records a delivery that failed and will be redelivered.
pub fn record_fail() {
  counter!("stormweave_fails_total").increment(1);
}

/// Records a message a stage could not process.
pub fn record_stage_error(stage: &str) {
  counter!(
    "stormweave_stage_errors_total",
    "stage" => stage.to_string()
  )
  .increment(1);
}

/// Records a degraded (enrichment fallback) result.
pub fn record_degraded(stage: &str) {
  counter!(
    "stormweave_degraded_total",
    "stage" => stage.to_string()
  )
  .increment(1);
}

/// Records messages emitted by a stage on a stream.
pub fn record_emitted(stage: &str, stream: &str, count: u64) {
  counter!(
    "stormweave_emitted_total",
    "stage" => stage.to_string(),
    "stream" => stream.to_string()
  )
  .increment(count);
}

/// Records the outcome of a batch flush.
pub fn record_batch_flush(sink: &str, records: usize, success: bool) {
  let outcome = if success { "ok" } else { "error" };
  counter!(
    "stormweave_batch_flushes_total",
    "sink" => sink.to_string(),
    "outcome" => outcome
  )
  .increment(1);
  counter!(
    "stormweave_batch_records_total",
    "sink" => sink.to_string(),
    "outcome" => outcome
  )
  .increment(records as u64);
}

/// Records the number of incomplete join records held by a merge instance.
pub fn record_join_pending(stage: &str, pending: usize) {
  gauge!(
    "stormweave_join_pending",
    "stage" => stage.to_string()
  )
  .set(pending as f64);
}

/// Records the number of source deliveries awaiting settlement.
pub fn record_in_flight(source: &str, in_flight: usize) {
  gauge!(
    "stormweave_in_flight",
    "source" => source.to_string()
  )
  .set(in_flight as f64);
}
