//! Typed errors for the generation job layer.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell
//! a failed job creation apart from a lost status write.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`JobStore`](crate::traits::store::JobStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live row exists for the key
    #[error("job not found: {job_id}/{}", .chunk_id.as_deref().unwrap_or("-"))]
    NotFound {
        job_id: String,
        chunk_id: Option<String>,
    },

    /// The requested status change is not an edge of the state machine
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// Another completed row already holds this input hash
    #[error("completed job already exists for hash {hash}")]
    DuplicateCompletedHash { hash: String },

    /// Result payload could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying storage failed
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors surfaced by the caller-facing job operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// The store rejected the lookup or insert during get-or-create
    #[error("job creation failed: {0}")]
    Creation(#[source] StoreError),

    /// A status transition could not be persisted
    #[error("status write failed: {0}")]
    StatusWrite(#[source] StoreError),

    /// A read against the store failed
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Failure reported by a generator.
///
/// The retry policy treats every variant the same way; the split only
/// exists so logs and callers can tell a deadline from a bad response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Upstream call failed (rate limit, 5xx, refusal, ...)
    #[error("{0}")]
    Failed(String),

    /// The generator's own deadline elapsed
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// The model answered but the output was unusable
    #[error("invalid output: {0}")]
    InvalidOutput(String),
}

impl GenerationError {
    /// Shorthand for [`GenerationError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors from a full get-or-create plus retry run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Job bookkeeping failed before generation started
    #[error(transparent)]
    Job(#[from] JobError),

    /// Generation failed on every permitted attempt
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Errors loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was present but could not be parsed
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    /// Parsed values violate a constraint
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for job operations.
pub type Result<T> = std::result::Result<T, JobError>;
