//! Metrics collection and export for the relay.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_core::Dispatch;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
    pub const MESSAGES_TOTAL: &str = "relay_messages_total";
    pub const DELIVERIES_TOTAL: &str = "relay_deliveries_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "relay_delivery_failures_total";
    pub const MALFORMED_TOTAL: &str = "relay_malformed_messages_total";
    pub const ROOMS_ACTIVE: &str = "relay_rooms_active";
    pub const ERRORS_TOTAL: &str = "relay_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Inbound messages by event");
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Envelopes handed to room peers"
    );
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Envelopes that could not be handed to a room peer"
    );
    metrics::describe_counter!(names::MALFORMED_TOTAL, "Dropped malformed messages");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of non-empty rooms");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of transport errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record the outcome of dispatching one inbound message.
pub fn record_dispatch(dispatch: &Dispatch) {
    match dispatch {
        Dispatch::Joined { .. } => {
            counter!(names::MESSAGES_TOTAL, "event" => "join").increment(1);
        }
        Dispatch::Broadcast {
            event,
            delivered,
            failed,
        } => {
            counter!(names::MESSAGES_TOTAL, "event" => event.clone()).increment(1);
            counter!(names::DELIVERIES_TOTAL).increment(*delivered as u64);
            counter!(names::DELIVERY_FAILURES_TOTAL).increment(*failed as u64);
        }
        Dispatch::Ignored { .. } => {
            counter!(names::MESSAGES_TOTAL, "event" => "unknown").increment(1);
        }
        Dispatch::Dropped { .. } => {
            counter!(names::MALFORMED_TOTAL).increment(1);
        }
    }
}

/// Update active room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
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
        record_disconnection();
    }
}
