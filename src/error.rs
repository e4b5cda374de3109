// Error taxonomy for range requests.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// `from > to` or a negative index. Never retried.
    #[error("invalid range [{from}, {to}]")]
    InvalidRange { from: i64, to: i64 },

    /// The source could not produce the requested vectors.
    #[error("failed to read {file}: {reason}")]
    FetchFailure { file: String, reason: String },

    /// The client connection went away while an answer was being delivered.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl CacheError {
    pub fn fetch(file: &str, reason: impl ToString) -> Self {
        CacheError::FetchFailure {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable tag used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::InvalidRange { .. } => "invalid_range",
            CacheError::FetchFailure { .. } => "fetch_failure",
            CacheError::Transport(_) => "transport",
        }
    }
}
