//! JSON-RPC 2.0 message types carried over the broker
//!
//! Requests and responses are plain JSON-RPC 2.0 envelopes. The broker adds
//! its own correlation id and reply address as message properties (see
//! [`crate::transport`]), so the envelope `id` is informational: the
//! server echoes it, the client does not rely on it.
//!
//! # Message Types
//!
//! 1. **Request**: a call with positional params that expects one response
//! 2. **Response**: the result of processing a request (success or error)
//!
//! Params are always an ordered array. Named params are not produced by the
//! client adapter.

use crate::error::JsonRpcErrorData;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-RPC protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// JSON-RPC 2.0 request ID
///
/// JSON-RPC 2.0 allows string, number, or null ids. mqrpc clients always send a
/// UUID string; the other forms are accepted from foreign peers and echoed
/// back unchanged.
///
/// # Examples
///
/// ```rust
/// use mqrpc_core::Id;
///
/// let id1: Id = "req-123".into();
/// let id2: Id = 42i64.into();
///
/// assert_eq!(id1.to_string(), "\"req-123\"");
/// assert_eq!(id2.to_string(), "42");
/// assert_eq!(Id::default(), Id::Null);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Id {
    /// String identifier, a UUID for requests built by this crate
    String(String),
    /// Numeric identifier, kept as written (the full `i64` and `u64` ranges)
    Number(serde_json::Number),
    /// Null identifier, used when the request id could not be determined
    #[default]
    Null,
}

impl Id {
    /// Create a fresh random (UUID v4) id
    pub fn random() -> Self {
        Id::String(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n.into())
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n.into())
    }
}

/// JSON-RPC 2.0 request message
///
/// # Examples
///
/// ```rust
/// use mqrpc_core::{JsonRpcRequest, Id};
/// use serde_json::json;
///
/// let req = JsonRpcRequest::new("add", vec![json!(2), json!(3)], Id::Number(1.into()));
/// assert_eq!(req.jsonrpc, "2.0");
/// assert_eq!(req.params.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// Name of the remote method to invoke
    pub method: String,
    /// Positional parameters
    #[serde(default)]
    pub params: Vec<Value>,
    /// Request identifier, echoed by the server
    #[serde(default)]
    pub id: Id,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request with positional params
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Create a request with a fresh UUID id
    pub fn with_random_id(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self::new(method, params, Id::random())
    }
}

/// JSON-RPC 2.0 response message
///
/// Contains exactly one of `result` or `error` when built through
/// [`JsonRpcResponse::success`] or [`JsonRpcResponse::error`].
///
/// Decoding is lenient: a missing `jsonrpc` defaults to `"2.0"` and a
/// missing `id` to `Id::Null`, so a bare `{"error": {...}}` body decodes.
///
/// # Examples
///
/// ```rust
/// use mqrpc_core::{JsonRpcResponse, JsonRpcErrorData, Id};
/// use serde_json::json;
///
/// let success = JsonRpcResponse::success(json!({"value": 42}), Id::Number(1.into()));
/// assert!(success.is_success());
///
/// let error = JsonRpcResponse::error(
///     JsonRpcErrorData::method_not_found("unknownMethod"),
///     Id::Number(2.into())
/// );
/// assert!(error.is_error());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Request ID from the original request, or `Id::Null`
    #[serde(default)]
    pub id: Id,
    /// The result of the method invocation (present only on success)
    ///
    /// A `null` result deserializes to `None`; callers treat a response
    /// without `error` as a success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error information (present only on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
}

impl JsonRpcResponse {
    /// Create a successful response
    pub fn success(result: Value, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(error: JsonRpcErrorData, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// True when the response carries no error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when the response carries an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Split the response into its outcome
    ///
    /// A missing `result` on a success response yields `Value::Null`.
    pub fn into_result(self) -> std::result::Result<Value, JsonRpcErrorData> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new("add", vec![json!(2), json!(3)], Id::from("abc"));
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "add", "params": [2, 3], "id": "abc"})
        );
    }

    #[test]
    fn test_request_without_params() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"ping","id":7}"#).unwrap();

        assert!(req.params.is_empty());
        assert_eq!(req.id, Id::Number(7.into()));
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let a = JsonRpcRequest::with_random_id("m", vec![]);
        let b = JsonRpcRequest::with_random_id("m", vec![]);

        assert_ne!(a.id, b.id);
        match a.id {
            Id::String(s) => assert!(uuid::Uuid::parse_str(&s).is_ok()),
            other => panic!("expected string id, got {other}"),
        }
    }

    #[test]
    fn test_success_response_with_null_result() {
        let resp = JsonRpcResponse::success(Value::Null, Id::Number(1.into()));
        let text = serde_json::to_string(&resp).unwrap();
        assert!(text.contains(r#""result":null"#));

        let decoded: JsonRpcResponse = serde_json::from_str(&text).unwrap();
        assert!(decoded.is_success());
        assert_eq!(decoded.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_response_shape() {
        let resp = JsonRpcResponse::error(JsonRpcErrorData::parse_error(), Id::Null);
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_bare_error_body_decodes() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"error":{"code":-32603,"message":"worker crashed"}}"#)
                .unwrap();

        assert_eq!(resp.jsonrpc, "2.0");
        assert_eq!(resp.id, Id::Null);
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32603);
        assert_eq!(err.message, "worker crashed");
    }
}
