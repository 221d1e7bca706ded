//! CLI error types.

use runtime::ToolError;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is unreadable or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `call` parameters are not a JSON value.
    #[error("parameters are not valid JSON: {0}")]
    InvalidParams(#[source] serde_json::Error),

    /// A one-shot `call` came back as a failure.
    #[error("tool call failed: {0}")]
    Invocation(ToolError),

    /// Output could not be encoded.
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    /// An error occurred in the runtime layer.
    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    /// Built-in tool setup failed.
    #[error(transparent)]
    Tools(#[from] tools::Error),

    /// A remote `call` failed.
    #[error(transparent)]
    Client(#[from] client::Error),

    /// The HTTP server failed.
    #[error(transparent)]
    Server(#[from] server::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
