//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rpc_calls_total` (counter): intercepted calls by rpc, status
//! - `rpc_call_duration_seconds` (histogram): call latency by rpc
//! - `events_emitted_total` (counter): bus emissions by topic
//! - `listener_active_connections` (gauge): open connections by listener
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(rpc: &str, status: &'static str, start: Instant) {
    ::metrics::counter!("rpc_calls_total", "rpc" => rpc.to_string(), "status" => status)
        .increment(1);
    ::metrics::histogram!("rpc_call_duration_seconds", "rpc" => rpc.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_event_emitted(topic: &str, subscribers: usize) {
    ::metrics::counter!("events_emitted_total", "topic" => topic.to_string()).increment(1);
    tracing::trace!(topic, subscribers, "Event emitted");
}

pub fn record_active_connections(listener: &'static str, count: u64) {
    ::metrics::gauge!("listener_active_connections", "listener" => listener).set(count as f64);
}
