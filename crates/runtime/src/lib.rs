//! Capstan runtime: tool registry, dispatch and duplex connections.
//!
//! This crate is the transport-agnostic core of the server. Transports hand it
//! raw invocations (a tool name plus an untyped parameter object) and get back
//! a normalized [`InvocationResult`]; handlers never see unvalidated input.
//!
//! # Overview
//!
//! - **ToolRegistry**: name-keyed store of [`ToolDescriptor`]s, in
//!   registration order.
//! - **Dispatcher**: the single execution path: lookup, schema validation,
//!   bounded concurrency, timeout and panic isolation.
//! - **ConnectionManager**: runs duplex connections over any text
//!   `Stream`/`Sink` pair, correlating out-of-order responses to requests.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use protocol::{ParamSpec, ParamType, ParameterSchema};
//! use runtime::tools::{DispatchConfig, Dispatcher, ToolDescriptor, ToolRegistry, handler_fn};
//! use serde_json::json;
//!
//! # async fn example() -> runtime::Result<()> {
//! let registry = Arc::new(ToolRegistry::new());
//! registry
//!     .register(ToolDescriptor::new(
//!         "greet",
//!         "Say hello",
//!         ParameterSchema::new().field("name", ParamSpec::new(ParamType::String).required()),
//!         handler_fn(|params| async move {
//!             Ok(json!({ "greeting": format!("hello {}", params.str("name").unwrap_or_default()) }))
//!         }),
//!     ))
//!     .await?;
//!
//! let dispatcher = Dispatcher::new(registry, DispatchConfig::default());
//! let result = dispatcher.dispatch("greet", json!({ "name": "world" })).await;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
pub mod tools;

pub use connection::{
    Connection, ConnectionConfig, ConnectionId, ConnectionInfo, ConnectionManager,
    ConnectionState, Correlator, DEFAULT_CLOSE_GRACE, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_QUEUE_CAPACITY,
};
pub use error::{Error, Result};
pub use tools::{
    DispatchConfig, Dispatcher, HandlerError, InvocationRequest, InvocationResult, Params,
    ToolDescriptor, ToolError, ToolHandler, ToolRegistry, handler_fn,
};
