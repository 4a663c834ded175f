//! JSON-RPC 2.0 client over a message broker
//!
//! Calls are published to a named work queue with a fresh correlation id and
//! the direct reply-to address. All calls made on one channel share a single
//! reply consumer, owned by a [`ReplySession`].
//!
//! # Core Features
//!
//! - **Call/reply**: [`RpcClient`] sends any serde value and awaits its reply
//! - **JSON-RPC**: [`JsonRpcClient`] adds the 2.0 envelope, with explicit
//!   [`JsonRpcClient::invoke`] and typed [`JsonRpcClient::request`]
//! - **Timeouts**: optional per-client timeout, off by default
//! - **Connection retry**: build from a connector with a backoff strategy
//! - **Observability**: OpenTelemetry traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqrpc_client::ClientBuilder;
//! use mqrpc_core::MemoryBroker;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!     let client = ClientBuilder::new("calculator")
//!         .with_channel(Arc::new(broker.channel()))
//!         .build()
//!         .await?;
//!
//!     let sum: i64 = client.request("add", (2, 3)).await?;
//!     let raw = client.invoke("echo", vec![json!("hi")]).await?;
//!     println!("{sum} {raw}");
//!     Ok(())
//! }
//! ```

mod client_builder;
mod jsonrpc;
mod metrics;
mod rpc;
mod session;

pub use client_builder::ClientBuilder;
pub use jsonrpc::{IntoParams, JsonRpcClient};
pub use metrics::ClientMetrics;
pub use rpc::RpcClient;
pub use session::{PendingReply, ReplySession};
