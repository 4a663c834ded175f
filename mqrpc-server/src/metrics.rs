//! Server metrics definitions
//!
//! OpenTelemetry instruments recorded by [`crate::RpcServer`] when
//! observability is enabled via `ServerBuilder::with_observability()`.
//!
//! # Metrics Collected
//!
//! - **mqrpc.server.messages.total**: messages taken off the work queue (counter)
//! - **mqrpc.server.acks.total**: acknowledgments, by outcome (counter)
//! - **mqrpc.server.replies.total**: replies published or dropped (counter)
//! - **mqrpc.server.handler.duration**: handler latency in seconds (histogram)
//! - **mqrpc.server.handlers.active**: handlers currently running (gauge)
//! - **mqrpc.server.errors.total**: handler failures and publish errors (counter)
//!
//! # Examples
//!
//! ```rust,no_run
//! use mqrpc_server::ServerMetrics;
//!
//! let metrics = ServerMetrics::new("image-builder");
//! metrics.record_message("image-builder");
//! metrics.record_handler("image-builder", "success", 0.025);
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Server metrics for monitoring
///
/// All instruments are prefixed with `mqrpc.server.*`.
pub struct ServerMetrics {
    /// Total number of messages received
    pub messages_total: Counter<u64>,
    /// Total number of acknowledgments sent
    pub acks_total: Counter<u64>,
    /// Total number of replies
    pub replies_total: Counter<u64>,
    /// Handler duration in seconds
    pub handler_duration: Histogram<f64>,
    /// Handlers currently running
    pub handlers_active: Gauge<i64>,
    /// Total number of errors
    pub errors_total: Counter<u64>,
}

impl ServerMetrics {
    /// Create metrics on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            messages_total: meter
                .u64_counter("mqrpc.server.messages.total")
                .with_description("Total number of messages received from the work queue")
                .build(),
            acks_total: meter
                .u64_counter("mqrpc.server.acks.total")
                .with_description("Total number of acknowledgments")
                .build(),
            replies_total: meter
                .u64_counter("mqrpc.server.replies.total")
                .with_description("Total number of replies")
                .build(),
            handler_duration: meter
                .f64_histogram("mqrpc.server.handler.duration")
                .with_description("Handler duration in seconds")
                .build(),
            handlers_active: meter
                .i64_gauge("mqrpc.server.handlers.active")
                .with_description("Handlers currently running")
                .build(),
            errors_total: meter
                .u64_counter("mqrpc.server.errors.total")
                .with_description("Total number of errors")
                .build(),
        }
    }

    /// Record a message taken off `queue`
    pub fn record_message(&self, queue: &str) {
        self.messages_total
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    /// Record an acknowledgment attempt
    pub fn record_ack(&self, queue: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.acks_total.add(
            1,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("status", status),
            ],
        );
    }

    /// Record a reply, `outcome` is `published`, `dropped` or `failed`
    pub fn record_reply(&self, queue: &str, outcome: &str) {
        self.replies_total.add(
            1,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }

    /// Record a finished handler
    pub fn record_handler(&self, queue: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.handler_duration.record(duration_secs, attributes);
    }

    /// Update the number of running handlers
    pub fn update_active(&self, count: i64) {
        self.handlers_active.record(count, &[]);
    }

    /// Record an error
    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_type.to_string())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ServerMetrics::new("test-server");

        metrics.record_message("jobs");
        metrics.record_ack("jobs", true);
        metrics.record_ack("jobs", false);
        metrics.record_reply("jobs", "published");
        metrics.record_handler("jobs", "panic", 0.001);
        metrics.update_active(2);
        metrics.record_error("Transport");
    }

    #[test]
    fn test_metrics_on_sdk_meter() {
        use opentelemetry::metrics::MeterProvider as _;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder().build();
        let metrics = ServerMetrics::new_with_meter(&provider.meter("mqrpc-server-test"));

        metrics.record_message("jobs");
        metrics.record_reply("jobs", "dropped");
        let _ = provider.shutdown();
    }
}
