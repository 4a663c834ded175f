//! Codec for message bodies
//!
//! Broker messages carry raw bytes. This module turns Rust values into JSON
//! bodies and back, and classifies incoming request bodies the way a
//! JSON-RPC server needs them classified:
//!
//! - bytes that are not JSON → `-32700` Parse error, id `null`
//! - JSON that is not a request object → `-32600` Invalid Request
//! - otherwise a [`JsonRpcRequest`] with positional params
//!
//! # Params normalization
//!
//! Missing or `null` params become an empty list. An array is taken as the
//! positional list. Any other value is passed as a single positional
//! argument.
//!
//! # Examples
//!
//! ```rust
//! use mqrpc_core::{codec, JsonRpcRequest, Id};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new("add", vec![json!(2), json!(3)], Id::Number(1.into()));
//! let body = codec::encode(&request).unwrap();
//!
//! let decoded = codec::decode_request(&body).unwrap();
//! assert_eq!(decoded.method, "add");
//! ```

use crate::error::{Error, JsonRpcErrorData, Result};
use crate::types::{Id, JsonRpcRequest, JsonRpcResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encode any serializable value to a JSON body
///
/// # Errors
///
/// Returns `Error::Serialization` if the value cannot be represented as JSON.
pub fn encode<T: Serialize + ?Sized>(msg: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a JSON body into any deserializable type
///
/// # Errors
///
/// Returns `Error::Serialization` if the body is not valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a JSON-RPC response body
pub fn encode_response(resp: &JsonRpcResponse) -> Result<Vec<u8>> {
    encode(resp)
}

/// Decode a JSON-RPC response body
///
/// Accepts the lenient envelope described on [`JsonRpcResponse`].
pub fn decode_response(body: &[u8]) -> Result<JsonRpcResponse> {
    decode(body)
}

/// A request body that could not be turned into a [`JsonRpcRequest`]
///
/// Carries the wire error to reply with and the id to echo.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestError {
    /// Error object for the reply
    pub error: JsonRpcErrorData,
    /// Id to echo, `Id::Null` when it could not be determined
    pub id: Id,
}

impl RequestError {
    /// Build the error response for this failure
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::error(self.error, self.id)
    }
}

impl From<RequestError> for Error {
    fn from(e: RequestError) -> Self {
        Error::JsonRpc(e.error)
    }
}

/// Decode and validate a JSON-RPC request body
///
/// # Errors
///
/// - `-32700` with id `null` when the body is not JSON
/// - `-32600` when the body is JSON but not a request object; the id is
///   echoed if it is a valid id
///
/// # Examples
///
/// ```rust
/// use mqrpc_core::{codec, Id};
///
/// let err = codec::decode_request(b"{not json").unwrap_err();
/// assert_eq!(err.error.code, -32700);
/// assert_eq!(err.id, Id::Null);
///
/// let err = codec::decode_request(br#"{"id": 4, "params": []}"#).unwrap_err();
/// assert_eq!(err.error.code, -32600);
/// assert_eq!(err.id, Id::Number(4.into()));
/// ```
pub fn decode_request(body: &[u8]) -> std::result::Result<JsonRpcRequest, RequestError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| RequestError {
        error: JsonRpcErrorData::parse_error(),
        id: Id::Null,
    })?;

    let Value::Object(mut obj) = value else {
        return Err(invalid(Id::Null, "Invalid Request: expected an object"));
    };

    // Echo whatever id we can make sense of, even on invalid requests
    let id = match obj.remove("id") {
        None => Id::Null,
        Some(raw) => serde_json::from_value::<Id>(raw).unwrap_or(Id::Null),
    };

    if let Some(version) = obj.get("jsonrpc") {
        if version.as_str() != Some(crate::types::JSONRPC_VERSION) {
            return Err(invalid(id, "Invalid Request: jsonrpc must be \"2.0\""));
        }
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => return Err(invalid(id, "Invalid Request: method must be a string")),
        None => return Err(invalid(id, "Invalid Request: missing method")),
    };

    let params = match obj.remove("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    };

    Ok(JsonRpcRequest::new(method, params, id))
}

fn invalid(id: Id, msg: &str) -> RequestError {
    RequestError {
        error: JsonRpcErrorData::invalid_request(msg),
        id,
    }
}
