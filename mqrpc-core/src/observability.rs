//! Logging, tracing and metrics setup
//!
//! mqrpc logs through the `tracing` macros everywhere. This module wires
//! those events to an output:
//!
//! - a JSON `fmt` layer on stdout, filtered by `RUST_LOG` or the configured level
//! - optionally, an OpenTelemetry layer exporting spans over OTLP/gRPC
//! - optionally, an OTLP meter provider that the client and server metrics
//!   record into
//!
//! # Usage Pattern
//!
//! Initialize at startup, before building clients or servers. Only the
//! first successful call installs anything; the client and server builders
//! call it again and reuse what is installed:
//!
//! ```rust,no_run
//! use mqrpc_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("billing-worker")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("debug");
//!
//!     mqrpc_core::init_observability(config).expect("Failed to init observability");
//!
//!     // ... consume queues, make calls ...
//!
//!     mqrpc_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector endpoint
//! - `RUST_LOG`: Log level filter (e.g., "info", "mqrpc_server=debug")

use once_cell::sync::OnceCell;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type InitResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// How often the meter provider exports
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

static OBSERVABILITY: OnceCell<()> = OnceCell::new();

/// Observability configuration
///
/// # Defaults
///
/// - Service name: "mqrpc"
/// - Service version: the crate version
/// - OTLP endpoint: `$OTEL_EXPORTER_OTLP_ENDPOINT` or "http://localhost:4317"
/// - Traces and metrics enabled, logs enabled
/// - Log level: `$RUST_LOG` or "info"
///
/// # Examples
///
/// ```rust
/// use mqrpc_core::ObservabilityConfig;
///
/// let config = ObservabilityConfig::new("image-builder")
///     .with_endpoint("http://collector:4317")
///     .with_metrics(false);
/// assert_eq!(config.service_name, "image-builder");
/// ```
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to every span and metric
    pub service_name: String,
    /// Service version attached to every span and metric
    pub service_version: String,
    /// OTLP/gRPC collector endpoint
    pub otlp_endpoint: String,
    /// Export spans over OTLP
    pub enable_traces: bool,
    /// Export metrics over OTLP
    pub enable_metrics: bool,
    /// Emit JSON logs on stdout
    pub enable_logs: bool,
    /// Log filter directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "mqrpc".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    /// Create a configuration with a custom service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the OTLP collector endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Enable or disable span export
    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    /// Enable or disable metric export
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Enable or disable the stdout log layer
    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Initialize logging and OpenTelemetry with the given configuration
///
/// The first successful call installs the global tracing subscriber and the
/// tracer and meter providers. Later calls return `Ok` without touching
/// global state, whatever their configuration.
///
/// # Errors
///
/// - an OTLP exporter could not be built
/// - the log filter directive is invalid
/// - a global subscriber was installed by someone else
///
/// Nothing global is replaced when an error is returned.
pub fn init_observability(config: ObservabilityConfig) -> InitResult<()> {
    OBSERVABILITY.get_or_try_init(|| install(&config))?;
    Ok(())
}

/// True once [`init_observability`] has succeeded
pub fn observability_initialized() -> bool {
    OBSERVABILITY.get().is_some()
}

fn install(config: &ObservabilityConfig) -> InitResult<()> {
    let tracer_provider = if config.enable_traces {
        Some(build_tracer_provider(config)?)
    } else {
        None
    };
    let meter_provider = if config.enable_metrics {
        Some(build_meter_provider(config)?)
    } else {
        None
    };

    let tracer = tracer_provider.as_ref().map(|provider| {
        use opentelemetry::trace::TracerProvider as _;
        provider.tracer(config.service_name.clone())
    });
    init_tracing_subscriber(config, tracer)?;

    // Only publish the providers once the subscriber is in place
    if let Some(provider) = tracer_provider {
        global::set_tracer_provider(provider);
    }
    if let Some(provider) = meter_provider {
        global::set_meter_provider(provider);
    }

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "Observability initialized"
    );

    Ok(())
}

/// Build the OTLP tracer provider
fn build_tracer_provider(config: &ObservabilityConfig) -> InitResult<SdkTracerProvider> {
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build())
}

/// Build a meter provider exporting every 30 seconds.
fn build_meter_provider(config: &ObservabilityConfig) -> InitResult<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build())
}

fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> InitResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let fmt_layer = config.enable_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .json()
    });
    let telemetry_layer = tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t));

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Flush and shut down telemetry
///
/// The SDK providers flush on drop; this logs the shutdown so the last
/// batch includes it.
pub fn shutdown_observability() {
    tracing::info!("Shutting down observability");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "mqrpc");
        assert!(config.enable_traces);
        assert!(config.enable_metrics);
        assert!(config.enable_logs);
    }

    #[test]
    fn test_custom_config() {
        let config = ObservabilityConfig::new("test-service")
            .with_endpoint("http://custom:4317")
            .with_log_level("debug")
            .with_version("1.0.0")
            .with_traces(false);

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.otlp_endpoint, "http://custom:4317");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_version, "1.0.0");
        assert!(!config.enable_traces);
    }

    #[test]
    fn test_init_twice_reuses_installation() {
        let config = ObservabilityConfig::new("test-none")
            .with_traces(false)
            .with_metrics(false)
            .with_logs(false)
            .with_log_level("warn");

        assert!(init_observability(config.clone()).is_ok());
        assert!(observability_initialized());

        // Another configuration is not installed, and is not an error
        assert!(init_observability(config.with_log_level("debug")).is_ok());
    }

    #[test]
    fn test_shutdown_idempotent() {
        shutdown_observability();
        shutdown_observability();
    }
}
