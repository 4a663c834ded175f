//! Common test utilities for mqrpc-server integration tests
//!
//! Servers run on the in-memory broker. `RawCaller` talks to them with raw
//! bodies so malformed requests can be sent; `mqrpc-client` is used for the
//! end-to-end tests.

#![allow(dead_code)]

use mqrpc_client::{ClientBuilder, JsonRpcClient};
use mqrpc_core::{
    Channel, ConsumeOptions, Consumer, MemoryBroker, MemoryChannel, MessageProperties,
    REPLY_TO_QUEUE,
};
use mqrpc_server::{from_fn, from_typed_fn, JsonRpcServer, Router, RouterBuilder, ServerHandle};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Start a JSON-RPC server for `router` on its own channel
pub async fn serve(broker: &MemoryBroker, queue: &str, router: Router) -> (ServerHandle, MemoryChannel) {
    let channel = broker.channel();
    let handle = JsonRpcServer::builder()
        .queue(queue)
        .with_channel(Arc::new(channel.clone()))
        .router(router)
        .start()
        .await
        .unwrap();
    (handle, channel)
}

/// Router with the methods most tests use
///
/// - `add(a, b)`
/// - `echo(value)` returns its first param
/// - `sleep(ms)` waits and returns `ms`
/// - `fail()` errors with "boom"
/// - `explode()` panics
pub fn test_router() -> Router {
    RouterBuilder::new()
        .handler("add", from_typed_fn(|(a, b): (i64, i64)| async move { Ok(a + b) }))
        .handler(
            "echo",
            from_fn(|params| async move { Ok(params.into_iter().next().unwrap_or(Value::Null)) }),
        )
        .handler(
            "sleep",
            from_typed_fn(|(ms,): (u64,)| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            }),
        )
        .handler(
            "fail",
            from_fn(|_| async { Err(mqrpc_core::Error::application("boom")) }),
        )
        .handler(
            "explode",
            from_fn(|params| async move {
                if params.is_empty() {
                    panic!("kaboom");
                }
                Ok(Value::Null)
            }),
        )
        .build()
}

/// Sends raw bodies to a queue and collects replies
pub struct RawCaller {
    pub channel: MemoryChannel,
    replies: Consumer,
}

impl RawCaller {
    pub async fn new(broker: &MemoryBroker) -> Self {
        let channel = broker.channel();
        let replies = channel
            .consume(REPLY_TO_QUEUE, ConsumeOptions::no_ack())
            .await
            .unwrap();
        Self { channel, replies }
    }

    /// Send `body` asking for a reply and return the correlation id used
    pub async fn send(&self, queue: &str, body: &[u8]) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        self.channel
            .send_to_queue(
                queue,
                body.to_vec(),
                MessageProperties::correlated(correlation_id.clone()).with_reply_to(REPLY_TO_QUEUE),
            )
            .await
            .unwrap();
        correlation_id
    }

    /// Send `body` without a reply address
    pub async fn send_without_reply(&self, queue: &str, body: &[u8]) {
        self.channel
            .send_to_queue(queue, body.to_vec(), MessageProperties::correlated("orphan"))
            .await
            .unwrap();
    }

    /// Next reply as (correlation id, decoded body)
    pub async fn next_reply(&mut self) -> (String, Value) {
        let delivery = tokio::time::timeout(Duration::from_secs(5), self.replies.next())
            .await
            .expect("no reply within 5s")
            .expect("reply consumer closed");
        let body = serde_json::from_slice(&delivery.body).unwrap();
        (delivery.properties.correlation_id.unwrap_or_default(), body)
    }

    /// Send `body` and wait for its reply
    pub async fn call(&mut self, queue: &str, body: &[u8]) -> Value {
        let correlation_id = self.send(queue, body).await;
        let (reply_id, reply) = self.next_reply().await;
        assert_eq!(reply_id, correlation_id);
        reply
    }

    /// Call with a JSON request value
    pub async fn call_json(&mut self, queue: &str, request: Value) -> Value {
        let body = serde_json::to_vec(&request).unwrap();
        self.call(queue, &body).await
    }
}

/// JSON-RPC request value
pub fn request(method: &str, id: Value, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "id": id,
        "params": params,
    })
}

/// Client on its own channel
pub async fn client_for(broker: &MemoryBroker, queue: &str) -> JsonRpcClient {
    ClientBuilder::new(queue)
        .with_channel(Arc::new(broker.channel()))
        .build()
        .await
        .unwrap()
}

/// Wait until `channel` has acked `count` messages
pub async fn wait_for_acks(channel: &MemoryChannel, count: u64) {
    for _ in 0..100 {
        if channel.ack_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} acks, saw {}", count, channel.ack_count());
}
