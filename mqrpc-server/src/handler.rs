//! Method handlers
//!
//! A [`Handler`] receives the positional params of one JSON-RPC request and
//! produces its result. Handlers are stored type-erased in a
//! [`crate::Router`], so they take and return `serde_json::Value`.
//!
//! # Creating Handlers
//!
//! 1. **from_fn**: wrap an async closure over the raw params list
//! 2. **from_typed_fn**: wrap an async closure taking a deserializable type,
//!    usually a tuple matching the positional params
//! 3. **#[handler]**: annotate an async fn (via mqrpc-macros)
//!
//! # Examples
//!
//! ```rust
//! use mqrpc_server::{from_fn, from_typed_fn};
//! use serde_json::json;
//!
//! // add(2, 3)
//! let add = from_typed_fn(|(a, b): (i64, i64)| async move { Ok(a + b) });
//!
//! // Raw params
//! let count = from_fn(|params| async move { Ok(json!(params.len())) });
//! ```

use mqrpc_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by a handler
pub type HandlerResult = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Trait for JSON-RPC method handlers
///
/// Errors returned by a handler become error responses:
/// - `Error::InvalidParams` → -32602
/// - any other error → code 0, with the error's message
pub trait Handler: Send + Sync {
    /// Handle one call with its positional params
    fn handle(&self, params: Vec<Value>) -> HandlerResult;
}

/// Adapts an async function over raw params into a [`Handler`]
pub struct AsyncHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    func: F,
}

impl<F, Fut> AsyncHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    /// Wrap `func`
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Handler for AsyncHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn handle(&self, params: Vec<Value>) -> HandlerResult {
        Box::pin((self.func)(params))
    }
}

/// Create a handler from an async function over the raw params list
///
/// # Examples
///
/// ```rust
/// use mqrpc_server::from_fn;
///
/// let echo = from_fn(|params| async move {
///     Ok(params.into_iter().next().unwrap_or_default())
/// });
/// ```
pub fn from_fn<F, Fut>(func: F) -> Box<dyn Handler>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Box::new(AsyncHandler::new(func))
}

/// Create a handler with typed params and result
///
/// The params list is decoded into `P`:
/// - as a sequence first, so tuples and structs match positional params
/// - then, for a single param, from that element alone (`[{"a": 1}]` can
///   feed a struct)
/// - then, for no params, from `null` (so `()` works)
///
/// When none of these fit the handler fails with `Error::InvalidParams`.
///
/// # Examples
///
/// ```rust
/// use mqrpc_server::from_typed_fn;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Build {
///     git_ref: String,
///     push: bool,
/// }
///
/// // build({"git_ref": "main", "push": true})
/// let build = from_typed_fn(|b: Build| async move {
///     Ok(format!("{} push={}", b.git_ref, b.push))
/// });
///
/// // multiply(1.5, 4)
/// let multiply = from_typed_fn(|(a, b): (f64, f64)| async move { Ok(a * b) });
/// ```
pub fn from_typed_fn<P, R, F, Fut>(func: F) -> Box<dyn Handler>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let func = Arc::new(func);

    from_fn(move |params: Vec<Value>| {
        let func = Arc::clone(&func);
        async move {
            let params: P = decode_params(params)?;
            let result = func(params).await?;
            serde_json::to_value(result).map_err(|e| Error::Serialization(e.to_string()))
        }
    })
}

/// Decode a positional params list into `P`
pub fn decode_params<P: DeserializeOwned>(params: Vec<Value>) -> Result<P> {
    let first_error = match serde_json::from_value(Value::Array(params.clone())) {
        Ok(decoded) => return Ok(decoded),
        Err(e) => e,
    };

    let fallback = match params.len() {
        0 => serde_json::from_value(Value::Null).ok(),
        1 => params
            .into_iter()
            .next()
            .and_then(|only| serde_json::from_value(only).ok()),
        _ => None,
    };

    fallback.ok_or_else(|| Error::InvalidParams(first_error.to_string()))
}
