//! mqrpc - JSON-RPC 2.0 over a message broker
//!
//! Convenience crate re-exporting the mqrpc sub-crates, for a single
//! dependency providing both sides.
//!
//! # Architecture
//!
//! - **mqrpc-core**: envelopes, codec, errors, the `Channel` abstraction,
//!   connection retry and observability
//! - **mqrpc-server**: work queue consumer and JSON-RPC dispatch
//! - **mqrpc-client**: call/reply over a shared direct reply-to consumer
//! - **mqrpc-macros**: `#[handler]` for typed positional handlers
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqrpc::core::{MemoryBroker, Result};
//! use mqrpc::{handler, ClientBuilder, JsonRpcServer};
//! use std::sync::Arc;
//!
//! #[handler]
//! async fn add(a: i64, b: i64) -> Result<i64> {
//!     Ok(a + b)
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!
//!     let _server = JsonRpcServer::builder()
//!         .queue("calculator")
//!         .with_channel(Arc::new(broker.channel()))
//!         .handler("add", add())
//!         .start()
//!         .await?;
//!
//!     let client = ClientBuilder::new("calculator")
//!         .with_channel(Arc::new(broker.channel()))
//!         .build()
//!         .await?;
//!
//!     let sum: i64 = client.request("add", (2, 3)).await?;
//!     println!("2 + 3 = {}", sum);
//!     Ok(())
//! }
//! ```

pub use mqrpc_client as client;
pub use mqrpc_core as core;
pub use mqrpc_macros as macros;
pub use mqrpc_server as server;

pub use mqrpc_client::{ClientBuilder, JsonRpcClient};
pub use mqrpc_core::{Error, Result};
pub use mqrpc_macros::handler;
pub use mqrpc_server::{JsonRpcServer, ServerBuilder};
