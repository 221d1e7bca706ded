//! Duplex frame types (JSON text frames tagged by `type`).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::schema::ParameterSchema;

/// Client-supplied correlation identifier (string or number), echoed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationId {
    String(String),
    Number(i64),
}

impl From<i64> for CorrelationId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrelationId::String(s) => f.write_str(s),
            CorrelationId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Public view of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolListing {
    pub name: String,
    pub description: String,
    pub parameter_schema: ParameterSchema,
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Invoke {
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
        tool: String,
        #[serde(default, deserialize_with = "null_as_empty")]
        parameters: Map<String, Value>,
    },
    ListTools,
}

/// `"parameters": null` means no parameters.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ClientFrame {
    /// Parse a text frame, rejecting anything over `max_bytes`.
    pub fn parse(text: &str, max_bytes: usize) -> Result<Self> {
        if text.len() > max_bytes {
            return Err(Error::FrameTooLarge {
                size: text.len(),
                max: max_bytes,
            });
        }
        Ok(serde_json::from_str(text)?)
    }
}

/// Failure categories visible on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    InvalidParameters,
    Timeout,
    HandlerError,
    Overloaded,
}

/// Error payload of a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Invocation outcome as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { payload: Value },
    Error { error: ErrorBody },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ToolsList {
        tools: Vec<ToolListing>,
    },
    Result {
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
        #[serde(flatten)]
        outcome: Outcome,
    },
    ProtocolError {
        message: String,
        #[serde(
            rename = "correlationId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        correlation_id: Option<CorrelationId>,
    },
}

impl ServerFrame {
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
            correlation_id: None,
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
