//! Execution dispatcher: the single path every call takes to a handler.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

use super::{InvocationRequest, InvocationResult, ToolError, ToolRegistry, validate};

/// Default per-call execution budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of handlers allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 64;

/// Dispatcher limits.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Budget for a single handler run.
    pub timeout: Duration,
    /// Handlers running at once; further calls wait for a slot.
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Resolves, validates and runs tool calls, normalizing every outcome into
/// an [`InvocationResult`].
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    config: DispatchConfig,
    slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, config: DispatchConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            registry,
            config,
            slots,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Synchronous-channel entry point.
    pub async fn invoke(&self, request: InvocationRequest) -> InvocationResult {
        self.dispatch(&request.tool_name, request.raw_parameters).await
    }

    /// Run `tool_name` with `raw` parameters. Never panics or errors out:
    /// every failure comes back as [`InvocationResult::Failure`].
    ///
    /// Dropping the returned future aborts the handler task.
    pub async fn dispatch(&self, tool_name: &str, raw: Value) -> InvocationResult {
        let descriptor = match self.registry.lookup(tool_name).await {
            Ok(descriptor) => descriptor,
            Err(_) => {
                tracing::warn!(tool = %tool_name, "call to unknown tool");
                return InvocationResult::failure(ToolError::UnknownTool(tool_name.to_string()));
            }
        };

        let params = match validate(&descriptor.schema, &raw) {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!(tool = %tool_name, field = %e.field, "rejected parameters: {}", e.reason);
                return InvocationResult::failure(e.into());
            }
        };

        let Ok(slot) = self.slots.clone().acquire_owned().await else {
            return InvocationResult::failure(ToolError::HandlerError(
                "dispatcher is shut down".to_string(),
            ));
        };

        let handler = descriptor.handler.clone();
        let task = tokio::spawn(async move {
            let _slot = slot;
            handler.call(params).await
        });
        let _guard = AbortOnDrop(task.abort_handle());

        tracing::debug!(tool = %tool_name, "dispatching");
        match tokio::time::timeout(self.config.timeout, task).await {
            Ok(Ok(Ok(payload))) => InvocationResult::success(payload),
            Ok(Ok(Err(e))) => {
                tracing::warn!(tool = %tool_name, "handler failed: {e}");
                InvocationResult::failure(ToolError::HandlerError(e.message().to_string()))
            }
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "handler was cancelled".to_string()
                };
                tracing::warn!(tool = %tool_name, "handler crashed: {message}");
                InvocationResult::failure(ToolError::HandlerError(message))
            }
            Err(_) => {
                let budget = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(tool = %tool_name, timeout_ms = budget, "handler timed out");
                InvocationResult::failure(ToolError::Timeout(budget))
            }
        }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
