//! JSON-RPC 2.0 server over a message broker
//!
//! A server consumes one named work queue. Each message carries a request
//! body plus `correlation_id` and `reply_to` properties; the server answers
//! on `reply_to` with the same correlation id.
//!
//! # Core Features
//!
//! - **Queue consumer**: [`RpcServer`] acks each message, runs its handler
//!   in a separate task and publishes the reply
//! - **JSON-RPC**: [`JsonRpcServer`] validates the envelope and dispatches by
//!   method name through a [`Router`]
//! - **Typed handlers**: [`from_typed_fn`] and the `#[handler]` macro decode
//!   positional params into Rust types
//! - **Failure isolation**: handler errors and panics still produce a reply
//! - **Observability**: OpenTelemetry traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqrpc_core::MemoryBroker;
//! use mqrpc_server::{from_typed_fn, JsonRpcServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!     let handle = JsonRpcServer::builder()
//!         .queue("calculator")
//!         .with_channel(Arc::new(broker.channel()))
//!         .handler("add", from_typed_fn(|(a, b): (i64, i64)| async move {
//!             Ok(a + b)
//!         }))
//!         .start()
//!         .await?;
//!
//!     handle.join().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Delivery semantics
//!
//! Messages are acknowledged before their handler runs, so a crash loses
//! the message instead of redelivering it (at-most-once). There is no
//! ordering between messages: handlers run concurrently.

mod builder;
mod handler;
mod jsonrpc;
mod metrics;
mod router;
mod rpc;

pub use builder::ServerBuilder;
pub use handler::{decode_params, from_fn, from_typed_fn, AsyncHandler, Handler, HandlerResult};
pub use jsonrpc::JsonRpcServer;
pub use metrics::ServerMetrics;
pub use router::{Router, RouterBuilder};
pub use rpc::{MessageHandler, RpcServer, ServerHandle};

#[doc(hidden)]
pub mod __private {
    pub use serde::de::IgnoredAny;
}
