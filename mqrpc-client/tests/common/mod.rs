//! Common test utilities for mqrpc-client integration tests
//!
//! A mock worker that consumes a queue on the in-memory broker and answers
//! requests, so the client can be tested without `mqrpc-server`.

#![allow(dead_code)]

use mqrpc_client::{ClientBuilder, JsonRpcClient, ReplySession};
use mqrpc_core::{
    Channel, ConsumeOptions, Consumer, Delivery, MemoryBroker, MemoryChannel, MessageProperties,
    QueueOptions, DEFAULT_EXCHANGE,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Mock worker on a queue
pub struct MockWorker {
    pub channel: MemoryChannel,
    requests_rx: mpsc::UnboundedReceiver<Delivery>,
}

impl MockWorker {
    /// Declare `queue` and answer every request with `handler`
    ///
    /// The handler gets the decoded request body and returns the reply body,
    /// or `None` to stay silent.
    pub async fn with_handler<F>(broker: &MemoryBroker, queue: &str, handler: F) -> Self
    where
        F: Fn(Value) -> Option<Value> + Send + 'static,
    {
        let channel = broker.channel();
        channel.assert_queue(queue, QueueOptions::durable()).await.unwrap();
        let mut consumer = channel.consume(queue, ConsumeOptions::no_ack()).await.unwrap();
        let (tx, requests_rx) = mpsc::unbounded_channel();

        let replier = channel.clone();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let _ = tx.send(delivery.clone());
                let request: Value = serde_json::from_slice(&delivery.body).unwrap_or(Value::Null);
                if let Some(reply) = handler(request) {
                    reply_to(&replier, &delivery, &reply).await;
                }
            }
        });

        Self {
            channel,
            requests_rx,
        }
    }

    /// A worker that never replies
    pub async fn silent(broker: &MemoryBroker, queue: &str) -> Self {
        Self::with_handler(broker, queue, |_| None).await
    }

    /// Wait for the next request the worker saw
    pub async fn next_request(&mut self) -> Option<Delivery> {
        tokio::time::timeout(Duration::from_secs(5), self.requests_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Declare `queue` and return a raw consumer, for tests that reply by hand
pub async fn manual_worker(broker: &MemoryBroker, queue: &str) -> (MemoryChannel, Consumer) {
    let channel = broker.channel();
    channel.assert_queue(queue, QueueOptions::durable()).await.unwrap();
    let consumer = channel.consume(queue, ConsumeOptions::no_ack()).await.unwrap();
    (channel, consumer)
}

/// Publish `reply` to the delivery's reply address with its correlation id
pub async fn reply_to(channel: &MemoryChannel, delivery: &Delivery, reply: &Value) {
    let address = delivery.properties.reply_to.clone().unwrap();
    let correlation_id = delivery.properties.correlation_id.clone().unwrap();
    channel
        .publish(
            DEFAULT_EXCHANGE,
            &address,
            serde_json::to_vec(reply).unwrap(),
            MessageProperties::correlated(correlation_id),
        )
        .await
        .unwrap();
}

/// Client on its own channel
pub async fn client_for(broker: &MemoryBroker, queue: &str) -> (JsonRpcClient, MemoryChannel) {
    let channel = broker.channel();
    let client = ClientBuilder::new(queue)
        .with_channel(Arc::new(channel.clone()))
        .build()
        .await
        .unwrap();
    (client, channel)
}

/// Client with a call timeout
pub async fn client_with_timeout(
    broker: &MemoryBroker,
    queue: &str,
    timeout: Duration,
) -> JsonRpcClient {
    ClientBuilder::new(queue)
        .with_channel(Arc::new(broker.channel()))
        .timeout(timeout)
        .build()
        .await
        .unwrap()
}

/// Shared session on a fresh channel
pub fn shared_session(broker: &MemoryBroker) -> (Arc<ReplySession>, MemoryChannel) {
    let channel = broker.channel();
    (Arc::new(ReplySession::new(Arc::new(channel.clone()))), channel)
}

/// Helper to create a mock JSON-RPC response
pub fn mock_response(id: &Value, result: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id
    })
}

/// Helper to create a mock JSON-RPC error response
pub fn mock_error_response(id: &Value, code: i32, message: &str, data: Option<Value>) -> Value {
    let mut error = serde_json::json!({
        "code": code,
        "message": message
    });
    if let Some(data) = data {
        error["data"] = data;
    }
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": error,
        "id": id
    })
}

/// Mock worker implementing `add` and `echo`
pub async fn calculator(broker: &MemoryBroker, queue: &str) -> MockWorker {
    MockWorker::with_handler(broker, queue, |request| {
        let id = request["id"].clone();
        let params = request["params"].as_array().cloned().unwrap_or_default();
        match request["method"].as_str() {
            Some("add") => {
                let sum: i64 = params.iter().filter_map(Value::as_i64).sum();
                Some(mock_response(&id, sum.into()))
            }
            Some("echo") => Some(mock_response(&id, params.first().cloned().unwrap_or(Value::Null))),
            Some(other) => Some(mock_error_response(
                &id,
                -32601,
                &format!("Method not found: {}", other),
                None,
            )),
            None => None,
        }
    })
    .await
}
