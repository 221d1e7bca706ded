//! Tool registration, validation and dispatch.

mod dispatch;
pub mod errors;
mod handler;
mod registry;
mod schema;
mod types;

pub use dispatch::{DEFAULT_MAX_CONCURRENT, DEFAULT_TIMEOUT, DispatchConfig, Dispatcher};
pub use errors::{HandlerError, ToolError};
pub use handler::{FnHandler, ToolHandler, handler_fn};
pub use registry::{ToolList, ToolRegistry};
pub use schema::{PAYLOAD_FIELD, ValidationError, validate};
pub use types::{InvocationRequest, InvocationResult, Params, ToolDescriptor};
