//! In-process broker
//!
//! [`MemoryBroker`] keeps named queues in memory and hands out
//! [`MemoryChannel`]s implementing [`Channel`]. It covers the subset of
//! broker behaviour mqrpc relies on:
//!
//! - FIFO queues with at most one live consumer each
//! - direct reply-to: every channel owns a private reply queue, and sending
//!   with `reply_to = REPLY_TO_QUEUE` rewrites the address to it
//! - the default exchange routes by queue name
//! - per-channel delivery tags and acknowledgment bookkeeping
//! - [`MemoryBroker::disconnect`] drops every open channel, like a broker
//!   restart: consumers end, private reply queues vanish, and further use of
//!   an old channel fails with `Error::ConnectionClosed`
//!
//! It is meant for tests and single-process setups, not as a broker.
//!
//! # Examples
//!
//! ```rust
//! use mqrpc_core::transport::memory::MemoryBroker;
//! use mqrpc_core::transport::{Channel, ConsumeOptions, MessageProperties, QueueOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> mqrpc_core::Result<()> {
//! let broker = MemoryBroker::new();
//! let channel = broker.channel();
//!
//! channel.assert_queue("jobs", QueueOptions::durable()).await?;
//! let mut consumer = channel.consume("jobs", ConsumeOptions::manual_ack()).await?;
//! channel.send_to_queue("jobs", b"hello".to_vec(), MessageProperties::default()).await?;
//!
//! let delivery = consumer.next().await.unwrap();
//! channel.ack(&delivery).await?;
//! assert_eq!(channel.ack_count(), 1);
//! # Ok(())
//! # }
//! ```

use super::{
    Channel, ConsumeOptions, Connector, Consumer, Delivery, MessageProperties, QueueOptions,
    DEFAULT_EXCHANGE, REPLY_TO_QUEUE,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Shared in-memory broker
///
/// Cloning yields another handle to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    generation: Arc<AtomicU64>,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, Queue>,
    consumer_seq: u64,
}

struct Queue {
    durable: bool,
    backlog: VecDeque<Message>,
    consumer: Option<Subscription>,
}

struct Message {
    body: Vec<u8>,
    properties: MessageProperties,
}

struct Subscription {
    tx: mpsc::UnboundedSender<Delivery>,
    channel: Arc<ChannelState>,
    no_ack: bool,
}

struct ChannelState {
    generation: u64,
    reply_queue: String,
    next_tag: AtomicU64,
    unacked: Mutex<HashSet<u64>>,
    acked: AtomicU64,
}

impl Queue {
    fn new(durable: bool) -> Self {
        Self {
            durable,
            backlog: VecDeque::new(),
            consumer: None,
        }
    }

    fn has_live_consumer(&self) -> bool {
        self.consumer.as_ref().is_some_and(|c| !c.tx.is_closed())
    }

    async fn push(&mut self, message: Message) {
        self.backlog.push_back(message);
        self.drain().await;
    }

    /// Hand backlog messages to the consumer until either runs out
    async fn drain(&mut self) {
        while let Some(sub) = &self.consumer {
            let Some(message) = self.backlog.pop_front() else {
                break;
            };
            if let Err(message) = sub.deliver(message).await {
                self.backlog.push_front(message);
                self.consumer = None;
            }
        }
    }
}

impl Subscription {
    async fn deliver(&self, message: Message) -> std::result::Result<(), Message> {
        let tag = self.channel.next_tag.fetch_add(1, Ordering::SeqCst);
        if !self.no_ack {
            self.channel.unacked.lock().await.insert(tag);
        }

        let delivery = Delivery {
            delivery_tag: tag,
            body: message.body,
            properties: message.properties,
        };

        if let Err(mpsc::error::SendError(delivery)) = self.tx.send(delivery) {
            self.channel.unacked.lock().await.remove(&tag);
            return Err(Message {
                body: delivery.body,
                properties: delivery.properties,
            });
        }
        Ok(())
    }
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new channel on this broker
    pub fn channel(&self) -> MemoryChannel {
        MemoryChannel {
            broker: self.clone(),
            state: Arc::new(ChannelState {
                generation: self.generation.load(Ordering::SeqCst),
                reply_queue: format!("{}.{}", REPLY_TO_QUEUE, uuid::Uuid::new_v4()),
                next_tag: AtomicU64::new(1),
                unacked: Mutex::new(HashSet::new()),
                acked: AtomicU64::new(0),
            }),
        }
    }

    /// Number of messages waiting in a queue, `None` if it does not exist
    pub async fn queue_len(&self, name: &str) -> Option<usize> {
        let state = self.state.lock().await;
        state.queues.get(name).map(|q| q.backlog.len())
    }

    /// True if the queue exists
    pub async fn has_queue(&self, name: &str) -> bool {
        self.state.lock().await.queues.contains_key(name)
    }

    /// True if the queue has a live consumer
    pub async fn has_consumer(&self, name: &str) -> bool {
        let state = self.state.lock().await;
        state.queues.get(name).is_some_and(Queue::has_live_consumer)
    }

    /// Close every channel opened so far
    ///
    /// Declared queues and their backlogs survive. Deliveries already handed
    /// to a consumer are lost.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let reply_prefix = format!("{}.", REPLY_TO_QUEUE);
        state.queues.retain(|name, _| !name.starts_with(&reply_prefix));
        for queue in state.queues.values_mut() {
            queue.consumer = None;
        }

        tracing::info!(generation, "Broker dropped all channels");
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn Channel>> {
        Ok(Arc::new(self.channel()))
    }
}

/// A channel on a [`MemoryBroker`]
///
/// Cloning yields another handle to the same channel, sharing its reply
/// queue and delivery tags.
#[derive(Clone)]
pub struct MemoryChannel {
    broker: MemoryBroker,
    state: Arc<ChannelState>,
}

impl MemoryChannel {
    /// The private queue that direct reply-to resolves to for this channel
    pub fn reply_address(&self) -> &str {
        &self.state.reply_queue
    }

    /// Number of successful acknowledgments on this channel
    pub fn ack_count(&self) -> u64 {
        self.state.acked.load(Ordering::SeqCst)
    }

    /// Number of deliveries awaiting acknowledgment on this channel
    pub async fn unacked_count(&self) -> usize {
        self.state.unacked.lock().await.len()
    }

    /// True once the broker dropped this channel
    pub fn is_closed(&self) -> bool {
        self.state.generation != self.broker.generation.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// Resolve the direct reply-to pseudo-queue to this channel's queue
    fn resolve_reply_to(
        &self,
        state: &BrokerState,
        mut properties: MessageProperties,
    ) -> Result<MessageProperties> {
        if properties.reply_to.as_deref() == Some(REPLY_TO_QUEUE) {
            let consuming = state
                .queues
                .get(&self.state.reply_queue)
                .is_some_and(Queue::has_live_consumer);
            if !consuming {
                return Err(Error::Transport(format!(
                    "reply_to '{}' used without consuming it on this channel",
                    REPLY_TO_QUEUE
                )));
            }
            properties.reply_to = Some(self.state.reply_queue.clone());
        }
        Ok(properties)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn assert_queue(&self, name: &str, options: QueueOptions) -> Result<()> {
        if name.starts_with("amq.") {
            return Err(Error::Transport(format!(
                "queue name '{}' is reserved",
                name
            )));
        }

        let mut state = self.broker.state.lock().await;
        self.ensure_open()?;
        match state.queues.get(name) {
            Some(queue) if queue.durable != options.durable => Err(Error::Transport(format!(
                "queue '{}' already declared with durable={}",
                name, queue.durable
            ))),
            Some(_) => Ok(()),
            None => {
                tracing::debug!(queue = %name, durable = options.durable, "Declared queue");
                state.queues.insert(name.to_string(), Queue::new(options.durable));
                Ok(())
            }
        }
    }

    async fn send_to_queue(
        &self,
        queue: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<()> {
        let mut state = self.broker.state.lock().await;
        self.ensure_open()?;
        let properties = self.resolve_reply_to(&state, properties)?;

        let target = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| Error::Transport(format!("queue '{}' not found", queue)))?;
        target.push(Message { body, properties }).await;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<()> {
        if exchange != DEFAULT_EXCHANGE {
            return Err(Error::Transport(format!("exchange '{}' not found", exchange)));
        }

        let mut state = self.broker.state.lock().await;
        self.ensure_open()?;
        let properties = self.resolve_reply_to(&state, properties)?;

        match state.queues.get_mut(routing_key) {
            Some(target) => target.push(Message { body, properties }).await,
            None => tracing::debug!(routing_key = %routing_key, "Dropping unroutable message"),
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer> {
        let mut state = self.broker.state.lock().await;
        self.ensure_open()?;

        let name = if queue == REPLY_TO_QUEUE {
            if !options.no_ack {
                return Err(Error::Transport(format!(
                    "'{}' must be consumed with no_ack",
                    REPLY_TO_QUEUE
                )));
            }
            let reply_queue = self.state.reply_queue.clone();
            state
                .queues
                .entry(reply_queue.clone())
                .or_insert_with(|| Queue::new(false));
            reply_queue
        } else {
            queue.to_string()
        };

        state.consumer_seq += 1;
        let tag = format!("ctag-{}", state.consumer_seq);

        let target = state
            .queues
            .get_mut(&name)
            .ok_or_else(|| Error::Transport(format!("queue '{}' not found", queue)))?;
        if target.has_live_consumer() {
            return Err(Error::Transport(format!(
                "queue '{}' already has a consumer",
                queue
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        target.consumer = Some(Subscription {
            tx,
            channel: self.state.clone(),
            no_ack: options.no_ack,
        });
        target.drain().await;

        tracing::debug!(queue = %queue, consumer_tag = %tag, no_ack = options.no_ack, "Started consumer");
        Ok(Consumer::new(tag, rx))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.ensure_open()?;
        if self.state.unacked.lock().await.remove(&delivery.delivery_tag) {
            self.state.acked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(Error::Transport(format!(
                "unknown delivery tag {}",
                delivery.delivery_tag
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> MessageProperties {
        MessageProperties::default()
    }

    #[tokio::test]
    async fn test_send_to_undeclared_queue_fails() {
        let channel = MemoryBroker::new().channel();
        let result = channel.send_to_queue("nowhere", b"x".to_vec(), props()).await;

        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_backlog_is_delivered_in_order() {
        let broker = MemoryBroker::new();
        let channel = broker.channel();
        channel.assert_queue("q", QueueOptions::durable()).await.unwrap();

        for i in 0..3u8 {
            channel.send_to_queue("q", vec![i], props()).await.unwrap();
        }
        assert_eq!(broker.queue_len("q").await, Some(3));

        let mut consumer = channel.consume("q", ConsumeOptions::no_ack()).await.unwrap();
        for i in 0..3u8 {
            assert_eq!(consumer.next().await.unwrap().body, vec![i]);
        }
        assert_eq!(broker.queue_len("q").await, Some(0));
    }

    #[tokio::test]
    async fn test_redeclare_with_different_durability_fails() {
        let channel = MemoryBroker::new().channel();
        channel.assert_queue("q", QueueOptions::durable()).await.unwrap();
        channel.assert_queue("q", QueueOptions::durable()).await.unwrap();

        let result = channel.assert_queue("q", QueueOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reserved_queue_names_rejected() {
        let channel = MemoryBroker::new().channel();
        assert!(channel.assert_queue(REPLY_TO_QUEUE, QueueOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_single_consumer_per_queue() {
        let channel = MemoryBroker::new().channel();
        channel.assert_queue("q", QueueOptions::default()).await.unwrap();

        let first = channel.consume("q", ConsumeOptions::no_ack()).await.unwrap();
        assert!(channel.consume("q", ConsumeOptions::no_ack()).await.is_err());

        // A dropped consumer frees the queue
        drop(first);
        assert!(channel.consume("q", ConsumeOptions::no_ack()).await.is_ok());
    }

    #[tokio::test]
    async fn test_message_requeued_when_consumer_dropped() {
        let broker = MemoryBroker::new();
        let channel = broker.channel();
        channel.assert_queue("q", QueueOptions::default()).await.unwrap();

        let consumer = channel.consume("q", ConsumeOptions::no_ack()).await.unwrap();
        drop(consumer);
        channel.send_to_queue("q", b"kept".to_vec(), props()).await.unwrap();
        assert_eq!(broker.queue_len("q").await, Some(1));

        let mut consumer = channel.consume("q", ConsumeOptions::no_ack()).await.unwrap();
        assert_eq!(consumer.next().await.unwrap().body, b"kept".to_vec());
    }

    #[tokio::test]
    async fn test_direct_reply_to_round_trip() {
        let broker = MemoryBroker::new();
        let client = broker.channel();
        let server = broker.channel();
        server.assert_queue("rpc", QueueOptions::durable()).await.unwrap();

        let mut requests = server.consume("rpc", ConsumeOptions::manual_ack()).await.unwrap();
        let mut replies = client.consume(REPLY_TO_QUEUE, ConsumeOptions::no_ack()).await.unwrap();

        client
            .send_to_queue(
                "rpc",
                b"ping".to_vec(),
                MessageProperties::correlated("c-1").with_reply_to(REPLY_TO_QUEUE),
            )
            .await
            .unwrap();

        let request = requests.next().await.unwrap();
        let reply_to = request.properties.reply_to.clone().unwrap();
        assert_eq!(reply_to, client.reply_address());

        server
            .publish(DEFAULT_EXCHANGE, &reply_to, b"pong".to_vec(), MessageProperties::correlated("c-1"))
            .await
            .unwrap();

        let reply = replies.next().await.unwrap();
        assert_eq!(reply.body, b"pong".to_vec());
        assert_eq!(reply.properties.correlation_id.as_deref(), Some("c-1"));
    }

    #[tokio::test]
    async fn test_reply_to_requires_reply_consumer() {
        let channel = MemoryBroker::new().channel();
        channel.assert_queue("rpc", QueueOptions::default()).await.unwrap();

        let result = channel
            .send_to_queue("rpc", b"x".to_vec(), props().with_reply_to(REPLY_TO_QUEUE))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reply_queue_consumed_once_and_without_acks() {
        let channel = MemoryBroker::new().channel();

        assert!(channel.consume(REPLY_TO_QUEUE, ConsumeOptions::manual_ack()).await.is_err());
        let _replies = channel.consume(REPLY_TO_QUEUE, ConsumeOptions::no_ack()).await.unwrap();
        assert!(channel.consume(REPLY_TO_QUEUE, ConsumeOptions::no_ack()).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_routing() {
        let channel = MemoryBroker::new().channel();

        let result = channel.publish("amq.topic", "q", b"x".to_vec(), props()).await;
        assert!(result.is_err());

        // Unroutable messages on the default exchange are dropped silently
        let result = channel.publish(DEFAULT_EXCHANGE, "missing", b"x".to_vec(), props()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_ack_bookkeeping() {
        let channel = MemoryBroker::new().channel();
        channel.assert_queue("q", QueueOptions::default()).await.unwrap();
        let mut consumer = channel.consume("q", ConsumeOptions::manual_ack()).await.unwrap();

        channel.send_to_queue("q", b"a".to_vec(), props()).await.unwrap();
        channel.send_to_queue("q", b"b".to_vec(), props()).await.unwrap();
        let first = consumer.next().await.unwrap();
        let second = consumer.next().await.unwrap();

        assert_ne!(first.delivery_tag, second.delivery_tag);
        assert_eq!(channel.unacked_count().await, 2);

        channel.ack(&first).await.unwrap();
        assert!(channel.ack(&first).await.is_err(), "double ack must fail");
        assert_eq!(channel.ack_count(), 1);
        assert_eq!(channel.unacked_count().await, 1);
    }

    #[tokio::test]
    async fn test_no_ack_deliveries_cannot_be_acked() {
        let channel = MemoryBroker::new().channel();
        channel.assert_queue("q", QueueOptions::default()).await.unwrap();
        let mut consumer = channel.consume("q", ConsumeOptions::no_ack()).await.unwrap();

        channel.send_to_queue("q", b"a".to_vec(), props()).await.unwrap();
        let delivery = consumer.next().await.unwrap();

        assert!(channel.ack(&delivery).await.is_err());
        assert_eq!(channel.ack_count(), 0);
    }

    #[tokio::test]
    async fn test_connector_opens_independent_channels() {
        let broker = MemoryBroker::new();
        let a = broker.connect().await.unwrap();
        let b = broker.connect().await.unwrap();

        a.assert_queue("shared", QueueOptions::default()).await.unwrap();
        b.send_to_queue("shared", b"x".to_vec(), props()).await.unwrap();
        assert_eq!(broker.queue_len("shared").await, Some(1));
    }

    #[tokio::test]
    async fn test_disconnect_closes_channels_and_keeps_queues() {
        let broker = MemoryBroker::new();
        let old = broker.channel();
        old.assert_queue("q", QueueOptions::durable()).await.unwrap();
        let mut consumer = old.consume("q", ConsumeOptions::manual_ack()).await.unwrap();
        let _replies = old.consume(REPLY_TO_QUEUE, ConsumeOptions::no_ack()).await.unwrap();

        broker.disconnect().await;

        assert!(old.is_closed());
        assert!(consumer.next().await.is_none());
        assert!(!broker.has_queue(old.reply_address()).await);
        assert!(matches!(
            old.send_to_queue("q", b"x".to_vec(), props()).await,
            Err(Error::ConnectionClosed)
        ));

        // A fresh channel sees the surviving queue and its backlog
        let fresh = broker.channel();
        assert!(!fresh.is_closed());
        fresh.send_to_queue("q", b"kept".to_vec(), props()).await.unwrap();
        let mut consumer = fresh.consume("q", ConsumeOptions::no_ack()).await.unwrap();
        assert_eq!(consumer.next().await.unwrap().body, b"kept".to_vec());
    }
}
