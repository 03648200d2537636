//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format when enabled.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const LINES_RECEIVED: &str = "ircpush_lines_received_total";
    pub const LINES_DROPPED: &str = "ircpush_lines_dropped_total";
    pub const MESSAGES_DELIVERED: &str = "ircpush_messages_delivered_total";
    pub const CHUNKS_SENT: &str = "ircpush_chunks_sent_total";
    pub const CONNECTIONS_ACTIVE: &str = "ircpush_tcp_connections_active";
    pub const RULE_RELOADS: &str = "ircpush_rule_reloads_total";
    pub const HIGHLIGHT_SECONDS: &str = "ircpush_highlight_seconds";
    pub const ERRORS_TOTAL: &str = "ircpush_errors_total";
}

/// Describe all metrics.
pub fn init_metrics() {
    metrics::describe_counter!(names::LINES_RECEIVED, "Input lines received");
    metrics::describe_counter!(
        names::LINES_DROPPED,
        "Input lines dropped before delivery, by reason"
    );
    metrics::describe_counter!(
        names::MESSAGES_DELIVERED,
        "Messages handed to IRC, by target channel"
    );
    metrics::describe_counter!(names::CHUNKS_SENT, "Message chunks sent after segmentation");
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of TCP input connections"
    );
    metrics::describe_counter!(names::RULE_RELOADS, "Highlight rule reloads, by outcome");
    metrics::describe_histogram!(
        names::HIGHLIGHT_SECONDS,
        "Time spent highlighting one message"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an input line.
pub fn record_line() {
    counter!(names::LINES_RECEIVED).increment(1);
}

/// Record a line that was not delivered.
pub fn record_dropped(reason: &'static str) {
    counter!(names::LINES_DROPPED, "reason" => reason).increment(1);
}

/// Record one message delivered to `channel` in `chunks` pieces.
pub fn record_delivery(channel: &str, chunks: usize) {
    counter!(names::MESSAGES_DELIVERED, "channel" => channel.to_string()).increment(1);
    counter!(names::CHUNKS_SENT).increment(chunks as u64);
}

/// Record highlighting latency.
pub fn record_highlight(seconds: f64) {
    histogram!(names::HIGHLIGHT_SECONDS).record(seconds);
}

/// Record a rule reload.
pub fn record_reload(ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    counter!(names::RULE_RELOADS, "outcome" => outcome).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Tracks an open TCP input connection; decrements the gauge on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
