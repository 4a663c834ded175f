//! Call/reply over a broker queue
//!
//! [`RpcClient`] sends a serialized request to one target queue and waits for
//! the single reply carrying the same correlation id. It is transport-level:
//! request and response are any serde types. The JSON-RPC envelope is added
//! by [`crate::JsonRpcClient`].

use crate::metrics::ClientMetrics;
use crate::session::ReplySession;
use mqrpc_core::{codec, Error, MessageProperties, Result, REPLY_TO_QUEUE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Client for one target queue
///
/// Cheap to clone; clones share the session.
///
/// # Examples
///
/// ```rust,no_run
/// use mqrpc_client::{ReplySession, RpcClient};
/// use mqrpc_core::MemoryBroker;
/// use serde_json::{json, Value};
/// use std::sync::Arc;
///
/// # async fn example() -> mqrpc_core::Result<()> {
/// let broker = MemoryBroker::new();
/// let session = Arc::new(ReplySession::new(Arc::new(broker.channel())));
/// let client = RpcClient::new(session, "image-builder");
///
/// let reply: Value = client.call(&json!({"ref": "main"})).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    session: Arc<ReplySession>,
    queue: String,
    timeout: Option<Duration>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl RpcClient {
    /// Create a client sending to `queue` through `session`
    pub fn new(session: Arc<ReplySession>, queue: impl Into<String>) -> Self {
        Self {
            session,
            queue: queue.into(),
            timeout: None,
            metrics: None,
        }
    }

    /// Give up on calls after `timeout`
    ///
    /// Without a timeout a call waits until its reply arrives.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn with_metrics(mut self, metrics: Option<Arc<ClientMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<ClientMetrics>> {
        self.metrics.as_ref()
    }

    /// Target queue name
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Configured call timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The session replies are received on
    pub fn session(&self) -> &Arc<ReplySession> {
        &self.session
    }

    /// Send `request` and decode the reply as `Resp`
    ///
    /// # Errors
    ///
    /// - `Error::Serialization` if the request cannot be encoded or the reply
    ///   does not decode as `Resp`
    /// - `Error::Transport` if the channel rejects the send
    /// - `Error::Timeout` if a timeout is configured and elapses
    /// - `Error::ConnectionClosed` if the reply consumer stops
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = codec::encode(request)?;
        let reply = self.call_raw(body).await?;
        codec::decode(&reply)
    }

    /// Send a raw body and return the raw reply body
    #[tracing::instrument(skip(self, body), fields(queue = %self.queue))]
    pub async fn call_raw(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        self.session.listen().await?;

        let correlation_id = Uuid::new_v4().to_string();

        // Register the pending call before sending
        let pending = self.session.register(correlation_id.clone()).await?;
        self.report_pending().await;

        let properties =
            MessageProperties::correlated(correlation_id.clone()).with_reply_to(REPLY_TO_QUEUE);
        if let Err(e) = self
            .session
            .channel()
            .await
            .send_to_queue(&self.queue, body, properties)
            .await
        {
            tracing::error!(error = %e, "Failed to send request");
            pending.cancel().await;
            self.report_pending().await;
            return Err(e);
        }

        tracing::debug!(correlation_id = %correlation_id, "Request sent, waiting for reply");

        let outcome = match self.timeout {
            None => pending.wait().await,
            Some(limit) => match tokio::time::timeout(limit, pending.wait()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.session.forget(&correlation_id).await;
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        timeout_ms = limit.as_millis() as u64,
                        "Call timed out"
                    );
                    if let Some(m) = &self.metrics {
                        m.record_timeout(&self.queue);
                    }
                    Err(Error::Timeout)
                }
            },
        };

        self.report_pending().await;
        outcome
    }

    async fn report_pending(&self) {
        if let Some(m) = &self.metrics {
            m.update_pending(self.session.pending_count().await);
        }
    }
}
