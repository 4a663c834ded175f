//! Server builder for JSON-RPC servers
//!
//! The builder collects what a server needs before it starts consuming:
//! - the work queue name and whether it is durable
//! - how to reach the broker (an open channel, or a connector plus retry
//!   strategies for connecting and for recovering a lost connection)
//! - the method handlers
//! - observability (OpenTelemetry) and the service name used for it
//!
//! # Examples
//!
//! ```rust,no_run
//! use mqrpc_core::{ExponentialBackoff, MemoryBroker};
//! use mqrpc_server::{from_typed_fn, JsonRpcServer};
//! use std::sync::Arc;
//!
//! # async fn example() -> mqrpc_core::Result<()> {
//! let broker = MemoryBroker::new();
//!
//! let handle = JsonRpcServer::builder()
//!     .queue("calculator")
//!     .with_connector(Arc::new(broker.clone()))
//!     .with_recovery(Box::new(ExponentialBackoff::messagebus()))
//!     .handler("add", from_typed_fn(|(a, b): (i64, i64)| async move { Ok(a + b) }))
//!     .with_default_observability()
//!     .start()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::{Handler, JsonRpcServer, Router, RpcServer, ServerHandle, ServerMetrics};
use mqrpc_core::{
    Channel, Connector, Error, ObservabilityConfig, QueueOptions, ReconnectionStrategy,
    Reconnector, Result,
};
use std::sync::Arc;

/// Builder for constructing a JSON-RPC server
pub struct ServerBuilder {
    queue: Option<String>,
    durable: bool,
    router: Router,
    channel: Option<Arc<dyn Channel>>,
    connector: Option<Arc<dyn Connector>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    recovery_strategy: Option<Box<dyn ReconnectionStrategy>>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            queue: None,
            durable: true,
            router: Router::new(),
            channel: None,
            connector: None,
            reconnect_strategy: None,
            recovery_strategy: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Name of the work queue to consume
    pub fn queue(mut self, name: impl Into<String>) -> Self {
        self.queue = Some(name.into());
        self
    }

    /// Declare the queue durable (the default) or transient
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Use an open channel
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Open a channel with `connector` when building
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Retry strategy for connecting (defaults to 10 attempts, 2s apart)
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    /// Pause between reconnect rounds after the connection is lost
    /// (defaults to [`mqrpc_core::ExponentialBackoff::messagebus`])
    ///
    /// Only used with [`ServerBuilder::with_connector`].
    pub fn with_recovery(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.recovery_strategy = Some(strategy);
        self
    }

    /// Register a method handler
    pub fn handler(mut self, method: impl Into<String>, handler: Box<dyn Handler>) -> Self {
        self.router.register(method, handler);
        self
    }

    /// Use a prebuilt router, replacing handlers registered so far
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the server without starting it
    pub async fn build(self) -> Result<RpcServer> {
        let queue = self
            .queue
            .ok_or_else(|| Error::InvalidRequest("No queue specified".to_string()))?;

        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            mqrpc_core::init_observability(config.clone()).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(ServerMetrics::new(&config.service_name)))
        } else {
            None
        };

        let (channel, reconnector) = match (self.channel, self.connector) {
            (Some(channel), _) => (channel, None),
            (None, Some(connector)) => {
                let mut reconnector = Reconnector::new(connector);
                if let Some(strategy) = self.reconnect_strategy {
                    reconnector = reconnector.with_connect_strategy(strategy);
                }
                if let Some(strategy) = self.recovery_strategy {
                    reconnector = reconnector.with_recovery_strategy(strategy);
                }
                (reconnector.connect().await?, Some(Arc::new(reconnector)))
            }
            (None, None) => {
                return Err(Error::Internal(
                    "server needs a channel or connector".to_string(),
                ))
            }
        };

        if self.router.is_empty() {
            tracing::warn!(queue = %queue, "Server has no methods registered");
        }
        tracing::debug!(queue = %queue, methods = ?self.router.methods(), "Server built");

        let mut server = RpcServer::new(channel, queue, Arc::new(JsonRpcServer::new(self.router)))
            .with_queue_options(QueueOptions {
                durable: self.durable,
            })
            .with_metrics(metrics);
        if let Some(reconnector) = reconnector {
            server = server.with_reconnector(reconnector);
        }
        Ok(server)
    }

    /// Build the server and start consuming
    pub async fn start(self) -> Result<ServerHandle> {
        self.build().await?.start().await
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRpcServer {
    /// Create a server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}
