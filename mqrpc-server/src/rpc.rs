//! Work queue consumer
//!
//! [`RpcServer`] declares a durable work queue, consumes it and answers every
//! message on the message's `reply_to` address. What a message means is up
//! to its [`MessageHandler`]; [`crate::JsonRpcServer`] is the JSON-RPC one.
//!
//! # Message lifecycle
//!
//! 1. The message is acknowledged as soon as it arrives (at-most-once).
//!    A failed ack is logged and the message is still handled.
//! 2. The handler runs in its own task, so a slow handler does not hold up
//!    the queue.
//! 3. The handler's value is published to `reply_to` through the default
//!    exchange with the original `correlation_id`. If the handler fails or
//!    panics, `{"error": {"code": -32603, "message": ...}}` is published
//!    instead so the caller is never left waiting.
//! 4. Without a `reply_to` the reply is dropped with a warning.
//!
//! When the channel ends the consumer, a server with a [`Reconnector`]
//! opens a new channel, declares the queue again and resumes consuming;
//! without one the server stops.

use crate::metrics::ServerMetrics;
use async_trait::async_trait;
use futures::FutureExt;
use mqrpc_core::{
    codec, Channel, ConsumeOptions, Consumer, Delivery, Error, JsonRpcErrorData,
    MessageProperties, QueueOptions, Reconnector, Result, DEFAULT_EXCHANGE,
};
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

/// Per-message handler
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use mqrpc_core::{Delivery, Result};
/// use mqrpc_server::MessageHandler;
/// use serde_json::{json, Value};
///
/// struct Length;
///
/// #[async_trait]
/// impl MessageHandler for Length {
///     async fn handle(&self, body: &[u8], _delivery: &Delivery) -> Result<Value> {
///         Ok(json!(body.len()))
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Produce the reply for one message
    async fn handle(&self, body: &[u8], delivery: &Delivery) -> Result<Value>;
}

/// Consumer for one named work queue
pub struct RpcServer {
    channel: Arc<dyn Channel>,
    queue: String,
    queue_options: QueueOptions,
    handler: Arc<dyn MessageHandler>,
    metrics: Option<Arc<ServerMetrics>>,
    reconnector: Option<Arc<Reconnector>>,
}

impl RpcServer {
    /// Create a server for `queue` on `channel`
    ///
    /// The queue is declared durable unless overridden with
    /// [`RpcServer::with_queue_options`].
    pub fn new(
        channel: Arc<dyn Channel>,
        queue: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            channel,
            queue: queue.into(),
            queue_options: QueueOptions::durable(),
            handler,
            metrics: None,
            reconnector: None,
        }
    }

    /// Declare the queue with `options` instead
    pub fn with_queue_options(mut self, options: QueueOptions) -> Self {
        self.queue_options = options;
        self
    }

    /// Reopen the channel through `reconnector` when it is lost
    pub fn with_reconnector(mut self, reconnector: Arc<Reconnector>) -> Self {
        self.reconnector = Some(reconnector);
        self
    }

    pub(crate) fn with_metrics(mut self, metrics: Option<Arc<ServerMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The work queue name
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Declare the queue and start consuming it
    ///
    /// Returns once the consumer is installed; messages are processed in the
    /// background until [`ServerHandle::shutdown`], or until the channel
    /// closes the consumer and it cannot be re-established.
    #[tracing::instrument(skip(self), fields(queue = %self.queue))]
    pub async fn start(self) -> Result<ServerHandle> {
        let consumer = subscribe(self.channel.as_ref(), &self.queue, self.queue_options).await?;

        tracing::info!(
            queue = %self.queue,
            durable = self.queue_options.durable,
            consumer_tag = %consumer.tag(),
            "Server consuming"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue = self.queue.clone();
        let dispatcher = Dispatcher {
            channel: RwLock::new(self.channel),
            queue: self.queue,
            queue_options: self.queue_options,
            handler: self.handler,
            metrics: self.metrics,
            reconnector: self.reconnector,
            active: Arc::new(AtomicI64::new(0)),
        };
        let task = tokio::spawn(consume_loop(dispatcher, consumer, shutdown_rx));

        Ok(ServerHandle {
            queue,
            shutdown_tx,
            task,
        })
    }
}

/// Handle to a running server
///
/// Dropping the handle stops the server like [`ServerHandle::shutdown`].
pub struct ServerHandle {
    queue: String,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The work queue being consumed
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Stop taking new messages
    ///
    /// Handlers already running finish and still publish their replies.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// True once the consume loop has stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the consume loop to stop
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("server task failed: {}", e)))
    }
}

/// Declare `queue` and consume it with manual acks
async fn subscribe(channel: &dyn Channel, queue: &str, options: QueueOptions) -> Result<Consumer> {
    channel.assert_queue(queue, options).await?;
    channel.consume(queue, ConsumeOptions::manual_ack()).await
}

/// Resolves once shutdown is requested or the handle is gone
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn consume_loop(
    dispatcher: Dispatcher,
    mut consumer: Consumer,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let dispatcher = Arc::new(dispatcher);

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => {
                tracing::info!(queue = %dispatcher.queue, "Server shutting down");
                break;
            }
            delivery = consumer.next() => {
                if let Some(delivery) = delivery {
                    dispatcher.accept(delivery).await;
                    continue;
                }

                let Some(reconnector) = dispatcher.reconnector.clone() else {
                    tracing::warn!(queue = %dispatcher.queue, "Consumer closed by channel");
                    break;
                };
                tracing::warn!(queue = %dispatcher.queue, "Consumer closed by channel, reconnecting");

                let recovered = tokio::select! {
                    _ = shutdown_requested(&mut shutdown_rx) => None,
                    recovered = dispatcher.recover(&reconnector) => recovered,
                };
                match recovered {
                    Some(next) => consumer = next,
                    None => {
                        tracing::info!(queue = %dispatcher.queue, "Consume loop stopped without a channel");
                        break;
                    }
                }
            }
        }
    }
}

struct Dispatcher {
    channel: RwLock<Arc<dyn Channel>>,
    queue: String,
    queue_options: QueueOptions,
    handler: Arc<dyn MessageHandler>,
    metrics: Option<Arc<ServerMetrics>>,
    reconnector: Option<Arc<Reconnector>>,
    active: Arc<AtomicI64>,
}

impl Dispatcher {
    /// Open a new channel and resume consuming, `None` once the reconnector
    /// gives up
    async fn recover(&self, reconnector: &Reconnector) -> Option<Consumer> {
        loop {
            let channel = match reconnector.reconnect().await {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::error!(queue = %self.queue, error = %e, "Giving up on the work queue");
                    return None;
                }
            };

            match subscribe(channel.as_ref(), &self.queue, self.queue_options).await {
                Ok(consumer) => {
                    tracing::info!(
                        queue = %self.queue,
                        consumer_tag = %consumer.tag(),
                        "Server consuming again"
                    );
                    *self.channel.write().await = channel;
                    return Some(consumer);
                }
                Err(e) => {
                    tracing::warn!(queue = %self.queue, error = %e, "Failed to resume consuming");
                }
            }
        }
    }

    /// Ack the delivery, then hand it to a dispatch task
    async fn accept(self: &Arc<Self>, delivery: Delivery) {
        tracing::debug!(
            queue = %self.queue,
            delivery_tag = delivery.delivery_tag,
            correlation_id = ?delivery.properties.correlation_id,
            "Message received"
        );
        if let Some(m) = &self.metrics {
            m.record_message(&self.queue);
        }

        let channel = self.channel.read().await.clone();
        let acked = match channel.ack(&delivery).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Failed to ack message"
                );
                false
            }
        };
        if let Some(m) = &self.metrics {
            m.record_ack(&self.queue, acked);
        }

        let this = Arc::clone(self);
        tokio::spawn(async move { this.dispatch(delivery).await });
    }

    async fn dispatch(&self, delivery: Delivery) {
        let start = Instant::now();
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(m) = &self.metrics {
            m.update_active(active);
        }

        let outcome = AssertUnwindSafe(self.handler.handle(&delivery.body, &delivery))
            .catch_unwind()
            .await;

        let (status, body) = match outcome {
            Ok(Ok(value)) => match codec::encode(&value) {
                Ok(body) => ("success", body),
                Err(e) => ("error", self.failure(&e.to_string(), e.name())),
            },
            Ok(Err(e)) => ("error", self.failure(&e.to_string(), e.name())),
            Err(panic) => ("panic", self.failure(&panic_message(panic.as_ref()), "Panic")),
        };

        let duration = start.elapsed().as_secs_f64();
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        if let Some(m) = &self.metrics {
            m.record_handler(&self.queue, status, duration);
            m.update_active(active);
        }

        self.reply(&delivery, body).await;
    }

    /// Body published when the handler did not produce a value
    fn failure(&self, message: &str, kind: &str) -> Vec<u8> {
        tracing::error!(queue = %self.queue, error = %message, "Handler failed");
        if let Some(m) = &self.metrics {
            m.record_error(kind);
        }
        let error = JsonRpcErrorData::internal_error(message);
        json!({ "error": { "code": error.code, "message": error.message } })
            .to_string()
            .into_bytes()
    }

    async fn reply(&self, delivery: &Delivery, body: Vec<u8>) {
        let Some(reply_to) = delivery.properties.reply_to.as_deref() else {
            tracing::warn!(
                queue = %self.queue,
                correlation_id = ?delivery.properties.correlation_id,
                "Message has no reply_to, dropping reply"
            );
            if let Some(m) = &self.metrics {
                m.record_reply(&self.queue, "dropped");
            }
            return;
        };

        let properties = MessageProperties {
            correlation_id: delivery.properties.correlation_id.clone(),
            reply_to: None,
        };
        let channel = self.channel.read().await.clone();
        match channel
            .publish(DEFAULT_EXCHANGE, reply_to, body, properties)
            .await
        {
            Ok(()) => {
                tracing::debug!(reply_to = %reply_to, "Reply published");
                if let Some(m) = &self.metrics {
                    m.record_reply(&self.queue, "published");
                }
            }
            Err(e) => {
                tracing::error!(reply_to = %reply_to, error = %e, "Failed to publish reply");
                if let Some(m) = &self.metrics {
                    m.record_reply(&self.queue, "failed");
                    m.record_error(e.name());
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqrpc_core::MemoryBroker;
    use std::time::Duration;

    struct Fixed(Value);

    #[async_trait]
    impl MessageHandler for Fixed {
        async fn handle(&self, _body: &[u8], _delivery: &Delivery) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked");
    }

    #[tokio::test]
    async fn test_start_declares_durable_queue() {
        let broker = MemoryBroker::new();
        let server = RpcServer::new(Arc::new(broker.channel()), "jobs", Arc::new(Fixed(json!(1))));
        assert_eq!(server.queue(), "jobs");

        let handle = server.start().await.unwrap();

        assert!(broker.has_queue("jobs").await);
        assert!(broker.has_consumer("jobs").await);
        assert_eq!(handle.queue(), "jobs");

        // A second declaration with another durability is rejected
        let other = broker.channel();
        assert!(other
            .assert_queue("jobs", QueueOptions { durable: false })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_second_server_on_queue_fails() {
        let broker = MemoryBroker::new();
        let _first = RpcServer::new(Arc::new(broker.channel()), "jobs", Arc::new(Fixed(json!(1))))
            .start()
            .await
            .unwrap();

        let second = RpcServer::new(Arc::new(broker.channel()), "jobs", Arc::new(Fixed(json!(2))))
            .start()
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_consumer() {
        let broker = MemoryBroker::new();
        let handle = RpcServer::new(Arc::new(broker.channel()), "jobs", Arc::new(Fixed(json!(1))))
            .start()
            .await
            .unwrap();

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap()
            .unwrap();

        assert!(!broker.has_consumer("jobs").await);
    }
}
