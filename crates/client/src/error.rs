//! Client error types.

use std::time::Duration;

use protocol::ErrorBody;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("not connected")]
    Disconnected,

    #[error("tool not found: {0}")]
    UnknownTool(String),

    #[error("parameters must be a JSON object, got {0}")]
    Parameters(Value),

    #[error("no response from {tool} within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    /// The server answered the call with a failure.
    #[error("tool failed ({:?}): {}", .0.kind, .0.message)]
    Tool(ErrorBody),

    /// The server rejected the frame carrying the call.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
