//! Message broker transport abstraction
//!
//! mqrpc does not talk to a broker directly. Everything it needs from one is
//! captured by the [`Channel`] trait, modelled on an AMQP channel:
//!
//! - declare a queue ([`Channel::assert_queue`])
//! - send to a queue, optionally with a reply address ([`Channel::send_to_queue`])
//! - publish through an exchange ([`Channel::publish`])
//! - consume a queue as a stream of [`Delivery`] values ([`Channel::consume`])
//! - acknowledge a delivery ([`Channel::ack`])
//!
//! Replies use the direct reply-to pseudo-queue [`REPLY_TO_QUEUE`]: a
//! client consumes it without acks, and sends requests with
//! `reply_to = REPLY_TO_QUEUE`. The broker rewrites that address so that a
//! server publishing to the default exchange with the received `reply_to`
//! as routing key reaches the right client.
//!
//! [`memory`] provides an in-process implementation.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Direct reply-to pseudo-queue name
pub const REPLY_TO_QUEUE: &str = "amq.rabbitmq.reply-to";

/// The default exchange, which routes by queue name
pub const DEFAULT_EXCHANGE: &str = "";

/// Properties carried alongside a message body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    /// Correlates a reply with its request
    pub correlation_id: Option<String>,
    /// Where the receiver should publish its reply
    pub reply_to: Option<String>,
}

impl MessageProperties {
    /// Properties with a correlation id only
    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            reply_to: None,
        }
    }

    /// Set the reply address
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// Queue declaration options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Survive broker restarts
    pub durable: bool,
}

impl QueueOptions {
    /// Options for a durable queue
    pub fn durable() -> Self {
        Self { durable: true }
    }
}

/// Consumer options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// Deliveries are considered acknowledged as soon as they are sent
    pub no_ack: bool,
}

impl ConsumeOptions {
    /// Consume without acknowledgments
    pub fn no_ack() -> Self {
        Self { no_ack: true }
    }

    /// Consume with explicit acknowledgments
    pub fn manual_ack() -> Self {
        Self { no_ack: false }
    }
}

/// A message handed to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to acknowledge this delivery
    pub delivery_tag: u64,
    /// Raw message body
    pub body: Vec<u8>,
    /// Message properties as sent
    pub properties: MessageProperties,
}

/// Stream of deliveries from one queue
///
/// Yields `None` once the channel side of the consumer is gone.
#[derive(Debug)]
pub struct Consumer {
    tag: String,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Consumer {
    /// Wrap a receiver fed by a channel implementation
    pub fn new(tag: impl Into<String>, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            tag: tag.into(),
            rx,
        }
    }

    /// Consumer tag assigned by the channel
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Wait for the next delivery
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// A broker channel
///
/// Implementations must be safe to share between tasks; mqrpc holds them as
/// `Arc<dyn Channel>` and calls them concurrently.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Declare a queue, creating it if it does not exist
    async fn assert_queue(&self, name: &str, options: QueueOptions) -> Result<()>;

    /// Send a message directly to a named queue
    async fn send_to_queue(
        &self,
        queue: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<()>;

    /// Publish a message through an exchange
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<()>;

    /// Start consuming a queue
    async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer>;

    /// Acknowledge a delivery received on this channel
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}

/// Opens broker channels
///
/// Used with [`crate::reconnect::connect_with_retry`] by the client and
/// server builders.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new channel
    async fn connect(&self) -> Result<Arc<dyn Channel>>;
}
