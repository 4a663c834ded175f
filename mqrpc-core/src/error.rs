//! Error types for mqrpc
//!
//! This module provides error handling for RPC calls carried over a message
//! broker. It defines two main error types:
//!
//! - **Error**: Application-level errors for internal use (uses thiserror)
//! - **JsonRpcErrorData**: Wire-format errors as defined by JSON-RPC 2.0
//!
//! # Error Codes
//!
//! JSON-RPC 2.0 defines standard error codes, and mqrpc adds one of its own:
//! - `-32700`: Parse error (invalid JSON)
//! - `-32600`: Invalid request (JSON, but not a request object)
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `0`: Application error raised by a handler
//!
//! Code `0` is outside the reserved range on purpose. Peers that already speak
//! this protocol match on it, so it is kept as-is on the wire.
//!
//! # Examples
//!
//! ```rust
//! use mqrpc_core::{Error, JsonRpcErrorData};
//!
//! let error = Error::application("boom");
//! let wire = JsonRpcErrorData::application_error(&error);
//! assert_eq!(wire.code, 0);
//! assert_eq!(wire.message, "boom");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for mqrpc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Parse error code (-32700)
pub const PARSE_ERROR: i32 = -32700;
/// Invalid request code (-32600)
pub const INVALID_REQUEST: i32 = -32600;
/// Method not found code (-32601)
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid params code (-32602)
pub const INVALID_PARAMS: i32 = -32602;
/// Internal error code (-32603)
pub const INTERNAL_ERROR: i32 = -32603;
/// Code used for errors raised by handler code
pub const APPLICATION_ERROR: i32 = 0;

/// Application-level error type for mqrpc operations
///
/// # Error Categories
///
/// - **Protocol errors**: InvalidRequest, MethodNotFound, InvalidParams
/// - **Remote errors**: JsonRpc (an error response received from a peer)
/// - **Transport errors**: Transport, ConnectionClosed, ConnectionFailed
/// - **Processing errors**: Serialization, Internal, Application
/// - **Operational errors**: Timeout
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// JSON-RPC protocol error (already in wire format)
    ///
    /// Returned by the client when the remote side answered with an `error`
    /// member. Carries `code`, `message` and `data` unchanged.
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failure reported by the broker channel
    ///
    /// Covers queue declaration, publishing, consuming and acknowledgment.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid JSON-RPC request format
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Method not found in the server's dispatch table
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid method parameters
    ///
    /// The method exists but the positional params could not be decoded
    /// into the handler's argument types.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Error raised by handler code
    ///
    /// The message is sent verbatim as the JSON-RPC error message with code 0.
    /// `data` is attached to the error object when present.
    #[error("{message}")]
    Application {
        /// Human-readable message
        message: String,
        /// Optional structured detail
        data: Option<serde_json::Value>,
    },

    /// Call timeout
    ///
    /// Only produced when a client was configured with a timeout.
    #[error("Request timeout")]
    Timeout,

    /// The channel or one of its consumers was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connecting to the broker failed after all retries
    #[error("Unable to connect to the message broker ({attempts} attempts)")]
    ConnectionFailed {
        /// Number of connection attempts made
        attempts: u32,
    },
}

impl Error {
    /// Create an application error with a message
    pub fn application(message: impl Into<String>) -> Self {
        Error::Application {
            message: message.into(),
            data: None,
        }
    }

    /// Create an application error with a message and structured data
    pub fn application_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Error::Application {
            message: message.into(),
            data: Some(data),
        }
    }

    /// Short name of the error kind, used as the `name` of serialized errors
    pub fn name(&self) -> &'static str {
        match self {
            Error::JsonRpc(_) => "JsonRpcError",
            Error::Serialization(_) => "SerializationError",
            Error::Transport(_) => "TransportError",
            Error::InvalidRequest(_) => "InvalidRequest",
            Error::MethodNotFound(_) => "MethodNotFound",
            Error::InvalidParams(_) => "InvalidParams",
            Error::Internal(_) => "InternalError",
            Error::Application { .. } => "Error",
            Error::Timeout => "Timeout",
            Error::ConnectionClosed => "ConnectionClosed",
            Error::ConnectionFailed { .. } => "ConnectionFailed",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// JSON-RPC 2.0 error object
///
/// This structure represents the exact wire format for JSON-RPC errors.
/// It appears in the `error` field of a `JsonRpcResponse`.
///
/// # Examples
///
/// ```rust
/// use mqrpc_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let error = JsonRpcErrorData::method_not_found("calculate");
/// assert_eq!(error.code, -32601);
///
/// let custom = JsonRpcErrorData::with_data(
///     1001,
///     "Insufficient funds",
///     json!({"balance": 50, "required": 100})
/// );
/// assert!(custom.data.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code indicating the error type
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Optional additional error information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    /// Create a new JSON-RPC error with code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new JSON-RPC error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a parse error (-32700)
    ///
    /// "Invalid JSON was received by the server."
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// Create an invalid request error (-32600)
    ///
    /// # Arguments
    ///
    /// * `msg` - Specific reason why the request is invalid
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, msg)
    }

    /// Create a method not found error (-32601)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mqrpc_core::JsonRpcErrorData;
    ///
    /// let error = JsonRpcErrorData::method_not_found("calculateFoo");
    /// assert_eq!(error.message, "Method not found: calculateFoo");
    /// ```
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method.into()))
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Create an internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    /// Wrap an error raised by handler code (code 0)
    ///
    /// The message is the error's display text. For `Error::Application`
    /// with data, that data becomes the `data` member; otherwise the error
    /// itself is serialized as `{"name": ..., "message": ...}`.
    pub fn application_error(err: &Error) -> Self {
        let message = err.to_string();
        let data = match err {
            Error::Application { data: Some(data), .. } => data.clone(),
            _ => serde_json::json!({
                "name": err.name(),
                "message": message,
            }),
        };
        Self::with_data(APPLICATION_ERROR, message, data)
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    /// Formats as "[code] message", e.g. "[-32601] Method not found: foo"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_from_serde() {
        let serde_error = serde_json::from_str::<serde_json::Value>(r#"{"invalid": json"#).unwrap_err();
        let error: Error = serde_error.into();

        match error {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_all_jsonrpc_error_codes() {
        let errors = vec![
            (JsonRpcErrorData::parse_error(), -32700),
            (JsonRpcErrorData::invalid_request("test"), -32600),
            (JsonRpcErrorData::method_not_found("test"), -32601),
            (JsonRpcErrorData::invalid_params("test"), -32602),
            (JsonRpcErrorData::internal_error("test"), -32603),
        ];

        for (error, expected_code) in errors {
            assert_eq!(error.code, expected_code);
            assert!(!error.message.is_empty());
        }
    }

    #[test]
    fn test_parse_error_message() {
        let error = JsonRpcErrorData::parse_error();
        assert_eq!(error.message, "Parse error");
        assert!(error.data.is_none());
    }

    #[test]
    fn test_application_error_keeps_plain_message() {
        let error = Error::application("boom");
        assert_eq!(error.to_string(), "boom");

        let wire = JsonRpcErrorData::application_error(&error);
        assert_eq!(wire.code, 0);
        assert_eq!(wire.message, "boom");
        assert_eq!(wire.data, Some(json!({"name": "Error", "message": "boom"})));
    }

    #[test]
    fn test_application_error_with_data() {
        let error = Error::application_with_data("quota exceeded", json!({"limit": 3}));
        let wire = JsonRpcErrorData::application_error(&error);

        assert_eq!(wire.code, 0);
        assert_eq!(wire.message, "quota exceeded");
        assert_eq!(wire.data, Some(json!({"limit": 3})));
    }

    #[test]
    fn test_application_error_from_other_variant() {
        let wire = JsonRpcErrorData::application_error(&Error::Internal("db down".into()));
        assert_eq!(wire.code, 0);
        assert_eq!(wire.message, "Internal error: db down");
        assert_eq!(wire.data.unwrap()["name"], "InternalError");
    }

    #[test]
    fn test_jsonrpc_error_display() {
        let display = JsonRpcErrorData::method_not_found("unknownMethod").to_string();
        assert!(display.contains("-32601"));
        assert!(display.contains("Method not found"));
    }

    #[test]
    fn test_error_deserialization_without_data() {
        let json = r#"{"code":-32601,"message":"Method not found"}"#;
        let error: JsonRpcErrorData = serde_json::from_str(json).unwrap();

        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
        assert!(error.data.is_none());
    }

    #[test]
    fn test_connection_failed_display() {
        let error = Error::ConnectionFailed { attempts: 10 };
        assert_eq!(
            error.to_string(),
            "Unable to connect to the message broker (10 attempts)"
        );
    }
}
