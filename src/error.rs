use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("circuit open for category '{0}'")]
    CircuitOpen(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cannot combine {left} data with {right} data")]
    ProvenanceMismatch { left: String, right: String },

    #[error("batch task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Serializable classification of a transport failure, stored on each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Protocol,
    InvalidRequest,
    CircuitOpen,
    Other,
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Network(_) => ErrorKind::Network,
            HarnessError::Timeout(_) => ErrorKind::Timeout,
            HarnessError::Protocol(_) => ErrorKind::Protocol,
            HarnessError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            HarnessError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            _ => ErrorKind::Other,
        }
    }

    /// Network-level failures that a retry might cure.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Timeout)
    }

    /// Classifies a reqwest failure. `timeout_ms` is reported for timeouts.
    ///
    /// A body cut off mid-read is a network failure; only content that arrived
    /// and cannot be decoded is a protocol error.
    pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            HarnessError::Timeout(timeout_ms)
        } else if err.is_builder() {
            HarnessError::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            HarnessError::Protocol(err.to_string())
        } else {
            HarnessError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
