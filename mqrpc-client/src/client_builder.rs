//! Client builder
//!
//! The `ClientBuilder` collects everything a client needs before the first
//! call:
//! - where requests go (the target queue)
//! - how to reach the broker (an existing session or channel, or a
//!   connector plus retry strategies for connecting and for recovering a
//!   lost connection)
//! - an optional call timeout
//! - observability (OpenTelemetry) and the service name used for it
//!
//! # Examples
//!
//! ```rust,no_run
//! use mqrpc_client::ClientBuilder;
//! use mqrpc_core::{ExponentialBackoff, FixedDelay, MemoryBroker};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> mqrpc_core::Result<()> {
//! let broker = MemoryBroker::new();
//!
//! // On an existing channel, with a timeout
//! let client = ClientBuilder::new("image-builder")
//!     .with_channel(Arc::new(broker.channel()))
//!     .timeout(Duration::from_secs(30))
//!     .build()
//!     .await?;
//!
//! // Connecting with retries, reconnecting after a connection loss
//! let client2 = ClientBuilder::new("billing")
//!     .with_connector(Arc::new(broker.clone()))
//!     .with_reconnect(Box::new(FixedDelay::new(Duration::from_secs(1)).with_max_attempts(5)))
//!     .with_recovery(Box::new(ExponentialBackoff::messagebus()))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::{ClientMetrics, JsonRpcClient, ReplySession, RpcClient};
use mqrpc_core::{
    Channel, Connector, Error, ObservabilityConfig, ReconnectionStrategy, Reconnector, Result,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring and creating a client
pub struct ClientBuilder {
    queue: String,
    session: Option<Arc<ReplySession>>,
    channel: Option<Arc<dyn Channel>>,
    connector: Option<Arc<dyn Connector>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    recovery_strategy: Option<Box<dyn ReconnectionStrategy>>,
    timeout: Option<Duration>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Create a builder for calls to `queue`
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            session: None,
            channel: None,
            connector: None,
            reconnect_strategy: None,
            recovery_strategy: None,
            timeout: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Share an existing reply session (takes precedence over a channel or connector)
    pub fn with_session(mut self, session: Arc<ReplySession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Use an open channel; a new reply session is created on it
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
    /// Only used with [`ClientBuilder::with_connector`].
    pub fn with_recovery(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.recovery_strategy = Some(strategy);
        self
    }

    /// Give up on calls after `timeout` (no timeout by default)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
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

    /// Build a transport-level client
    pub async fn build_rpc(self) -> Result<RpcClient> {
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            mqrpc_core::init_observability(config.clone()).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(ClientMetrics::new(&config.service_name)))
        } else {
            None
        };

        let session = match (self.session, self.channel, self.connector) {
            (Some(session), _, _) => session,
            (None, Some(channel), _) => Arc::new(ReplySession::new(channel)),
            (None, None, Some(connector)) => {
                let mut reconnector = Reconnector::new(connector);
                if let Some(strategy) = self.reconnect_strategy {
                    reconnector = reconnector.with_connect_strategy(strategy);
                }
                if let Some(strategy) = self.recovery_strategy {
                    reconnector = reconnector.with_recovery_strategy(strategy);
                }
                let channel = reconnector.connect().await?;
                Arc::new(ReplySession::with_reconnector(channel, Arc::new(reconnector)))
            }
            (None, None, None) => {
                return Err(Error::Internal(
                    "client needs a session, channel or connector".to_string(),
                ))
            }
        };

        let mut client = RpcClient::new(session, self.queue.clone()).with_metrics(metrics);
        if let Some(timeout) = self.timeout {
            client = client.with_timeout(timeout);
        }

        tracing::info!(queue = %self.queue, timeout = ?self.timeout, "Client ready");
        Ok(client)
    }

    /// Build a JSON-RPC client
    pub async fn build(self) -> Result<JsonRpcClient> {
        Ok(JsonRpcClient::new(self.build_rpc().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqrpc_core::{FixedDelay, MemoryBroker};

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new("jobs");

        assert_eq!(builder.queue, "jobs");
        assert!(builder.session.is_none());
        assert!(builder.channel.is_none());
        assert!(builder.connector.is_none());
        assert!(builder.timeout.is_none());
        assert!(builder.observability_config.is_none());
        assert!(builder.service_name.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let builder = ClientBuilder::new("jobs")
            .with_connector(Arc::new(MemoryBroker::new()))
            .with_reconnect(Box::new(FixedDelay::new(Duration::from_millis(10))))
            .with_recovery(Box::new(FixedDelay::new(Duration::from_millis(20))))
            .timeout(Duration::from_secs(5))
            .service_name("test-service")
            .with_default_observability();

        assert!(builder.connector.is_some());
        assert!(builder.reconnect_strategy.is_some());
        assert!(builder.recovery_strategy.is_some());
        assert_eq!(builder.timeout, Some(Duration::from_secs(5)));
        assert_eq!(builder.service_name, Some("test-service".to_string()));
        assert_eq!(builder.observability_config.unwrap().service_name, "mqrpc");
    }

    #[tokio::test]
    async fn test_build_without_transport_fails() {
        let result = ClientBuilder::new("jobs").build().await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_build_with_channel() {
        let broker = MemoryBroker::new();
        let client = ClientBuilder::new("jobs")
            .with_channel(Arc::new(broker.channel()))
            .timeout(Duration::from_millis(250))
            .build_rpc()
            .await
            .unwrap();

        assert_eq!(client.queue(), "jobs");
        assert_eq!(client.timeout(), Some(Duration::from_millis(250)));
        assert!(!client.session().is_listening());
    }

    #[tokio::test]
    async fn test_build_with_observability_twice() {
        let config = ObservabilityConfig::new("client-test")
            .with_traces(false)
            .with_metrics(false)
            .with_logs(false);

        for queue in ["a", "b"] {
            let client = ClientBuilder::new(queue)
                .with_channel(Arc::new(MemoryBroker::new().channel()))
                .with_observability(config.clone())
                .build_rpc()
                .await
                .unwrap();
            assert!(client.metrics().is_some());
        }
    }

    #[tokio::test]
    async fn test_build_with_connector() {
        let broker = MemoryBroker::new();
        let client = ClientBuilder::new("jobs")
            .with_connector(Arc::new(broker))
            .build()
            .await
            .unwrap();

        assert_eq!(client.rpc().queue(), "jobs");
    }

    #[tokio::test]
    async fn test_builders_share_session() {
        let broker = MemoryBroker::new();
        let session = Arc::new(ReplySession::new(Arc::new(broker.channel())));

        let a = ClientBuilder::new("a").with_session(session.clone()).build_rpc().await.unwrap();
        let b = ClientBuilder::new("b").with_session(session.clone()).build_rpc().await.unwrap();

        assert!(Arc::ptr_eq(a.session(), b.session()));
    }
}
