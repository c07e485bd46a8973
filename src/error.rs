//! Error taxonomy shared by the pipeline stages and the repository.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Payload carried no usable index scheme. Not retryable.
    #[error("provider payload has no usable air-quality index")]
    MissingIndexData,

    /// Upstream call failed, timed out, or returned something unparseable.
    #[error("upstream provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid profile input: {0}")]
    InvalidProfileInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl AdvisorError {
    /// Whether the Fetcher may reasonably try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdvisorError::UpstreamUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, AdvisorError>;
