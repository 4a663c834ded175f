//! Client metrics definitions
//!
//! OpenTelemetry instruments recorded by the client when observability is
//! enabled via `ClientBuilder::with_observability()`.
//!
//! # Metrics Collected
//!
//! - **mqrpc.client.calls.total**: calls made, by method and status (counter)
//! - **mqrpc.client.call.duration**: call latency in seconds (histogram)
//! - **mqrpc.client.errors.total**: failed calls by error kind (counter)
//! - **mqrpc.client.timeouts.total**: calls abandoned after the timeout (counter)
//! - **mqrpc.client.calls.pending**: calls waiting for a reply (gauge)

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Total number of calls made
    pub calls_total: Counter<u64>,
    /// Call duration in seconds
    pub call_duration: Histogram<f64>,
    /// Total number of failed calls
    pub errors_total: Counter<u64>,
    /// Total number of timed out calls
    pub timeouts_total: Counter<u64>,
    /// Calls currently waiting for a reply
    pub pending_calls: Gauge<i64>,
}

impl ClientMetrics {
    /// Create metrics on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            calls_total: meter
                .u64_counter("mqrpc.client.calls.total")
                .with_description("Total number of calls made")
                .build(),
            call_duration: meter
                .f64_histogram("mqrpc.client.call.duration")
                .with_description("Call duration in seconds")
                .build(),
            errors_total: meter
                .u64_counter("mqrpc.client.errors.total")
                .with_description("Total number of failed calls")
                .build(),
            timeouts_total: meter
                .u64_counter("mqrpc.client.timeouts.total")
                .with_description("Total number of calls that timed out")
                .build(),
            pending_calls: meter
                .i64_gauge("mqrpc.client.calls.pending")
                .with_description("Calls waiting for a reply")
                .build(),
        }
    }

    /// Record a finished call
    pub fn record_call(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.calls_total.add(1, attributes);
        self.call_duration.record(duration_secs, attributes);
    }

    /// Record a failed call
    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_type.to_string())]);
    }

    /// Record a timed out call
    pub fn record_timeout(&self, queue: &str) {
        self.timeouts_total
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    /// Update the number of pending calls
    pub fn update_pending(&self, count: usize) {
        self.pending_calls.record(count as i64, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ClientMetrics::new("test-client");

        metrics.record_call("add", "success", 0.05);
        metrics.record_call("missing", "error", 0.01);
        metrics.record_error("JsonRpcError");
        metrics.record_timeout("image-builder");
        metrics.update_pending(3);
    }

    #[test]
    fn test_metrics_on_sdk_meter() {
        use opentelemetry::metrics::MeterProvider as _;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder().build();
        let metrics = ClientMetrics::new_with_meter(&provider.meter("mqrpc-client-test"));

        metrics.record_call("add", "success", 0.01);
        metrics.update_pending(0);
        let _ = provider.shutdown();
    }
}
