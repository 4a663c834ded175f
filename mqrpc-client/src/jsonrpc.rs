//! JSON-RPC 2.0 calls on top of [`RpcClient`]
//!
//! [`JsonRpcClient::invoke`] wraps a method name and positional params in a
//! request envelope, sends it, and unwraps the response envelope:
//! `result` is returned, `error` becomes `Error::JsonRpc` with the remote
//! `code`, `message` and `data`.
//!
//! [`JsonRpcClient::request`] adds typed params and results. Params are
//! anything implementing [`IntoParams`]: `()`, tuples of up to eight
//! serializable values, or a `Vec<Value>`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mqrpc_client::ClientBuilder;
//! use mqrpc_core::MemoryBroker;
//! use std::sync::Arc;
//!
//! # async fn example() -> mqrpc_core::Result<()> {
//! let broker = MemoryBroker::new();
//! let client = ClientBuilder::new("calculator")
//!     .with_channel(Arc::new(broker.channel()))
//!     .build()
//!     .await?;
//!
//! let sum: i64 = client.request("add", (2, 3)).await?;
//! let status: String = client.request("status", ()).await?;
//! # Ok(())
//! # }
//! ```

use crate::rpc::RpcClient;
use mqrpc_core::{Error, JsonRpcRequest, JsonRpcResponse, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

/// Conversion into a positional params list
pub trait IntoParams {
    /// Convert into the `params` array of a request
    fn into_params(self) -> Result<Vec<Value>>;
}

impl IntoParams for () {
    fn into_params(self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

impl IntoParams for Vec<Value> {
    fn into_params(self) -> Result<Vec<Value>> {
        Ok(self)
    }
}

macro_rules! impl_into_params {
    ($($name:ident),+) => {
        impl<$($name: Serialize),+> IntoParams for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_params(self) -> Result<Vec<Value>> {
                let ($($name,)+) = self;
                Ok(vec![$(serde_json::to_value($name)?),+])
            }
        }
    };
}

impl_into_params!(A);
impl_into_params!(A, B);
impl_into_params!(A, B, C);
impl_into_params!(A, B, C, D);
impl_into_params!(A, B, C, D, E);
impl_into_params!(A, B, C, D, E, F);
impl_into_params!(A, B, C, D, E, F, G);
impl_into_params!(A, B, C, D, E, F, G, H);

/// JSON-RPC 2.0 client for one target queue
#[derive(Clone)]
pub struct JsonRpcClient {
    rpc: RpcClient,
}

impl JsonRpcClient {
    /// Wrap a transport-level client
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    /// The underlying transport-level client
    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Call `method` with positional `params`
    ///
    /// The response `id` is not compared with the request `id`; correlation
    /// is done by the transport.
    ///
    /// # Errors
    ///
    /// - `Error::JsonRpc` when the remote side answered with an error object
    /// - any error from [`RpcClient::call`]
    #[tracing::instrument(skip(self, params), fields(queue = %self.rpc.queue()))]
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let start = Instant::now();
        let request = JsonRpcRequest::with_random_id(method, params);

        let outcome = match self.rpc.call::<_, JsonRpcResponse>(&request).await {
            Ok(response) => response.into_result().map_err(Error::JsonRpc),
            Err(e) => Err(e),
        };

        let duration = start.elapsed().as_secs_f64();
        match &outcome {
            Ok(_) => {
                tracing::debug!(method = %method, duration_secs = duration, "Call completed");
                if let Some(m) = self.rpc.metrics() {
                    m.record_call(method, "success", duration);
                }
            }
            Err(e) => {
                tracing::debug!(method = %method, error = %e, "Call failed");
                if let Some(m) = self.rpc.metrics() {
                    m.record_call(method, "error", duration);
                    m.record_error(e.name());
                }
            }
        }

        outcome
    }

    /// Call `method` with typed params and decode the result as `R`
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # async fn example(client: mqrpc_client::JsonRpcClient) -> mqrpc_core::Result<()> {
    /// let product: f64 = client.request("multiply", (1.5, 4)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request<R, P>(&self, method: &str, params: P) -> Result<R>
    where
        R: DeserializeOwned,
        P: IntoParams,
    {
        let value = self.invoke(method, params.into_params()?).await?;
        serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_into_params() {
        assert!(().into_params().unwrap().is_empty());
    }

    #[test]
    fn test_tuple_into_params() {
        let params = (1, "two", json!({"three": 3})).into_params().unwrap();
        assert_eq!(params, vec![json!(1), json!("two"), json!({"three": 3})]);

        let single = (vec![1, 2],).into_params().unwrap();
        assert_eq!(single, vec![json!([1, 2])]);
    }

    #[test]
    fn test_eight_tuple_into_params() {
        let params = (1, 2, 3, 4, 5, 6, 7, 8).into_params().unwrap();
        assert_eq!(params.len(), 8);
        assert_eq!(params[7], json!(8));
    }

    #[test]
    fn test_vec_into_params_passthrough() {
        let raw = vec![json!(null), json!(true)];
        assert_eq!(raw.clone().into_params().unwrap(), raw);
    }
}
