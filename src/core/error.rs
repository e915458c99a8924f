// src/core/error.rs

use thiserror::Error;

/// Failure of a single check.
///
/// Always caught at the orchestrator boundary and recorded as an
/// `{"error": ...}` entry under the check's name; it never aborts the scan
/// as a whole. The `status` check is the one exception: its failure also
/// short-circuits the remaining target-scoped checks.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("dns resolution failed: {0}")]
    Dns(#[from] hickory_resolver::error::ResolveError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CheckError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Infrastructure failure of a whole scan.
///
/// Individual check failures never surface here; a scan produces a result
/// document even when every check fails. Only building the HTTP client or
/// persisting the final report can abort a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to persist scan result: {0}")]
    Persist(#[from] std::io::Error),
}

impl From<CheckError> for ScanError {
    fn from(err: CheckError) -> Self {
        match err {
            CheckError::Http(e) => ScanError::Client(e),
            CheckError::Io(e) => ScanError::Persist(e),
            other => ScanError::Persist(std::io::Error::other(other.to_string())),
        }
    }
}

/// Queue infrastructure failure. Unlike a check failure this is fatal to
/// the worker loop and surfaced to the caller.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("invalid job payload: {0}")]
    InvalidJob(String),
}
