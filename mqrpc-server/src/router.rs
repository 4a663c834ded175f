//! Dispatch table for JSON-RPC methods
//!
//! The router maps method names to handlers. It is filled once, before the
//! server starts, and then shared read-only by every dispatch task.
//!
//! # Examples
//!
//! ```rust
//! use mqrpc_server::{from_fn, from_typed_fn, Router};
//! use serde_json::json;
//!
//! let mut router = Router::new();
//! router.register("add", from_typed_fn(|(a, b): (i64, i64)| async move { Ok(a + b) }));
//! router.register("ping", from_fn(|_| async { Ok(json!("pong")) }));
//!
//! assert!(router.has_method("add"));
//! ```

use crate::handler::Handler;
use mqrpc_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Method name to handler mapping
///
/// Cloning is cheap; clones share the handlers.
#[derive(Clone, Default)]
pub struct Router {
    handlers: Arc<HashMap<String, Arc<dyn Handler>>>,
}

impl Router {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method, replacing any previous one
    pub fn register(&mut self, method: impl Into<String>, handler: Box<dyn Handler>) {
        let handlers = Arc::make_mut(&mut self.handlers);
        handlers.insert(method.into(), Arc::from(handler));
    }

    /// Get the handler for a method
    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(method).cloned()
    }

    /// Check if a method is registered
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no methods are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Call the handler registered for `method`
    ///
    /// Fails with `Error::MethodNotFound` if there is none.
    pub async fn route(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let handler = self
            .get(method)
            .ok_or_else(|| Error::MethodNotFound(method.to_string()))?;
        handler.handle(params).await
    }
}

/// Builder for constructing a router
#[derive(Default)]
pub struct RouterBuilder {
    router: Router,
}

impl RouterBuilder {
    /// Create a new router builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for a method
    pub fn handler(mut self, method: impl Into<String>, handler: Box<dyn Handler>) -> Self {
        self.router.register(method, handler);
        self
    }

    /// Build the router
    pub fn build(self) -> Router {
        self.router
    }
}
