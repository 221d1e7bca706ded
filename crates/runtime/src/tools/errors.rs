use protocol::{ErrorBody, FailureKind};
use thiserror::Error;

/// Failures produced at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameters { field: String, reason: String },
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("handler failed: {0}")]
    HandlerError(String),
    #[error("overloaded: more than {0} calls in flight")]
    Overloaded(usize),
}

impl ToolError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ToolError::UnknownTool(_) => FailureKind::UnknownTool,
            ToolError::InvalidParameters { .. } => FailureKind::InvalidParameters,
            ToolError::Timeout(_) => FailureKind::Timeout,
            ToolError::HandlerError(_) => FailureKind::HandlerError,
            ToolError::Overloaded(_) => FailureKind::Overloaded,
        }
    }

    /// Wire representation of this failure.
    pub fn to_body(&self) -> ErrorBody {
        let field = match self {
            ToolError::InvalidParameters { field, .. } => Some(field.clone()),
            _ => None,
        };
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            field,
        }
    }
}

/// Error raised by a tool handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
