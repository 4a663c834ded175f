//! Procedural macros for mqrpc
//!
//! # `#[handler]`
//!
//! Turns an async fn over positional parameters into a handler factory.
//! Each argument is one element of the request's `params` array, decoded
//! with serde; the `Ok` value is serialized as the `result`.
//!
//! ```ignore
//! use mqrpc_core::Result;
//! use mqrpc_macros::handler;
//! use mqrpc_server::RouterBuilder;
//!
//! #[handler]
//! async fn add(a: i64, b: i64) -> Result<i64> {
//!     Ok(a + b)
//! }
//!
//! #[handler]
//! async fn version() -> Result<&'static str> {
//!     Ok(env!("CARGO_PKG_VERSION"))
//! }
//!
//! let router = RouterBuilder::new()
//!     .handler("add", add())
//!     .handler("version", version())
//!     .build();
//! ```

mod handler;

use proc_macro::TokenStream;

/// Attribute macro for defining JSON-RPC handlers
///
/// Generates `fn name() -> Box<dyn mqrpc_server::Handler>` from
/// `async fn name(arg: T, ...) -> Result<R>`. The params array is decoded as
/// the tuple `(T, ...)`; a wrong count or type fails the call with
/// `-32602 Invalid params`. Without arguments any params are accepted and
/// ignored.
///
/// Visibility and attributes (doc comments, `cfg`) carry over to the
/// generated function.
///
/// # Limitations
///
/// - async free functions only: no `self`, no generics
/// - the return type must be `mqrpc_core::Result<R>` with `R: Serialize`
#[proc_macro_attribute]
pub fn handler(_attr: TokenStream, item: TokenStream) -> TokenStream {
    handler::handler_impl(item)
}
