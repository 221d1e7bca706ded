use protocol::CorrelationId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tool already registered: {0}")]
    DuplicateName(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("correlation id already in flight: {0}")]
    DuplicateCorrelation(CorrelationId),

    #[error("too many calls in flight (limit {limit})")]
    InFlightLimit { limit: usize },

    #[error(transparent)]
    Protocol(#[from] protocol::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
