//! Built-in tool error types.

use runtime::HandlerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("path '{0}' does not exist")]
    NotFound(String),

    #[error("'{0}' is neither a file nor a directory")]
    UnknownPathType(String),

    #[error("pattern must be relative to the search directory: {0}")]
    AbsolutePattern(String),

    #[error("unsupported analysis type: {0}")]
    UnsupportedAnalysis(String),

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("no username provided and no default username configured")]
    MissingUsername,

    #[error("GitHub API returned status code {status}: {message}")]
    GitHub { status: u16, message: String },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] runtime::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for HandlerError {
    fn from(error: Error) -> Self {
        HandlerError::new(error.to_string())
    }
}
