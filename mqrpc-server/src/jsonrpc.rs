//! JSON-RPC 2.0 message handler
//!
//! [`JsonRpcServer`] turns each message body into exactly one response
//! envelope:
//!
//! | Body                               | Reply                              |
//! |------------------------------------|------------------------------------|
//! | not JSON                           | `-32700` Parse error, `id: null`   |
//! | JSON, but not a request object     | `-32600` Invalid Request           |
//! | method not in the router           | `-32601` Method not found          |
//! | params do not fit a typed handler  | `-32602` Invalid params            |
//! | handler returned an error          | code `0`, the error's message      |
//! | handler returned a value           | `result`                           |
//!
//! The request `id` is echoed whenever it could be read.

use crate::router::Router;
use crate::rpc::MessageHandler;
use async_trait::async_trait;
use mqrpc_core::{
    codec, Delivery, Error, Id, JsonRpcErrorData, JsonRpcRequest, JsonRpcResponse, Result,
};
use serde_json::Value;
use std::time::Instant;

/// JSON-RPC 2.0 dispatcher over a [`Router`]
///
/// # Examples
///
/// ```rust,no_run
/// use mqrpc_core::MemoryBroker;
/// use mqrpc_server::{from_typed_fn, JsonRpcServer, RouterBuilder, RpcServer};
/// use std::sync::Arc;
///
/// # async fn example() -> mqrpc_core::Result<()> {
/// let router = RouterBuilder::new()
///     .handler("add", from_typed_fn(|(a, b): (i64, i64)| async move { Ok(a + b) }))
///     .build();
///
/// let broker = MemoryBroker::new();
/// let server = RpcServer::new(
///     Arc::new(broker.channel()),
///     "calculator",
///     Arc::new(JsonRpcServer::new(router)),
/// );
/// let handle = server.start().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct JsonRpcServer {
    router: Router,
}

impl JsonRpcServer {
    /// Dispatch requests through `router`
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// The dispatch table
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Produce the response for one request body
    pub async fn respond(&self, body: &[u8]) -> JsonRpcResponse {
        match codec::decode_request(body) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                tracing::warn!(code = e.error.code, id = %e.id, error = %e.error.message, "Rejected request");
                e.into_response()
            }
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest {
            method, params, id, ..
        } = request;

        let Some(handler) = self.router.get(&method) else {
            tracing::warn!(method = %method, id = %id, "Method not found");
            return JsonRpcResponse::error(JsonRpcErrorData::method_not_found(&method), id);
        };

        let start = Instant::now();
        let outcome = handler.handle(params).await;
        let duration = start.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => {
                tracing::debug!(method = %method, id = %id, duration_secs = duration, "Request handled");
                JsonRpcResponse::success(result, id)
            }
            Err(Error::InvalidParams(msg)) => {
                tracing::debug!(method = %method, id = %id, error = %msg, "Invalid params");
                JsonRpcResponse::error(JsonRpcErrorData::invalid_params(msg), id)
            }
            Err(e) => {
                tracing::debug!(method = %method, id = %id, error = %e, "Handler returned an error");
                JsonRpcResponse::error(JsonRpcErrorData::application_error(&e), id)
            }
        }
    }
}

#[async_trait]
impl MessageHandler for JsonRpcServer {
    #[tracing::instrument(
        skip(self, body, delivery),
        fields(correlation_id = ?delivery.properties.correlation_id)
    )]
    async fn handle(&self, body: &[u8], delivery: &Delivery) -> Result<Value> {
        let response = self.respond(body).await;
        let id = response.id.clone();

        match serde_json::to_value(&response) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                internal_error_response(e.to_string(), id)
            }
        }
    }
}

fn internal_error_response(message: String, id: Id) -> Result<Value> {
    let response = JsonRpcResponse::error(JsonRpcErrorData::internal_error(message), id);
    Ok(serde_json::to_value(&response)?)
}
