//! Core types for mqrpc, JSON-RPC 2.0 over a message broker
//!
//! This crate provides the pieces shared by the client and the server:
//!
//! - **Types**: JSON-RPC 2.0 request and response envelopes with positional params
//! - **Codec**: body encoding/decoding and request validation
//! - **Error handling**: the `Error` type and the JSON-RPC wire error object
//! - **Transport**: the `Channel` trait a broker must provide, plus an
//!   in-memory implementation
//! - **Reconnect**: retrying broker connections with backoff strategies
//! - **Observability**: tracing subscriber and OpenTelemetry setup
//!
//! # Architecture
//!
//! The crate knows nothing about a concrete broker library. `mqrpc-client`
//! and `mqrpc-server` build call/reply semantics on top of `Channel`, using
//! message properties (`correlation_id`, `reply_to`) for correlation.
//!
//! # Example
//!
//! ```rust
//! use mqrpc_core::{codec, Id, JsonRpcRequest};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new("add", vec![json!(5), json!(3)], Id::Number(1.into()));
//! let body = codec::encode(&request).unwrap();
//!
//! let decoded = codec::decode_request(&body).unwrap();
//! assert_eq!(decoded.method, "add");
//! assert_eq!(decoded.params, vec![json!(5), json!(3)]);
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod reconnect;
pub mod transport;
pub mod types;

pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{
    init_observability, observability_initialized, shutdown_observability, ObservabilityConfig,
};
pub use reconnect::{
    connect_with_retry, ExponentialBackoff, FixedDelay, NoReconnect, ReconnectionStrategy,
    Reconnector,
};
pub use transport::memory::{MemoryBroker, MemoryChannel};
pub use transport::{
    Channel, ConsumeOptions, Connector, Consumer, Delivery, MessageProperties, QueueOptions,
    DEFAULT_EXCHANGE, REPLY_TO_QUEUE,
};
pub use types::{Id, JsonRpcRequest, JsonRpcResponse};
