//! Tool handler trait.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{HandlerError, Params};

/// The function behind a tool.
///
/// Handlers only ever see parameters that already passed schema validation.
/// This is the boundary between the dispatcher and side effects.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Params) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn call(&self, params: Params) -> Result<Value, HandlerError> {
        (self.0)(params).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
