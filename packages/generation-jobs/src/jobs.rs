//! Caller-facing job operations.
//!
//! Thin wrappers over [`JobStore`] that classify store failures the way
//! callers handle them: creation failures propagate, status write failures
//! are usually logged and ignored.

use crate::error::{JobError, Result};
use crate::traits::store::{JobLookup, JobStore};
use crate::types::job::{Job, JobStatus};

/// Return a cached completed job, resume an open one, or create a new one.
pub async fn get_or_create_job<S: JobStore + ?Sized>(
    store: &S,
    job_id: &str,
    chunk_id: Option<&str>,
    job_type: &str,
    input_data: &[u8],
) -> Result<JobLookup> {
    store
        .get_or_create(job_id, chunk_id, job_type, input_data)
        .await
}

/// Move a job to `status`.
pub async fn update_job_status<S: JobStore + ?Sized>(
    store: &S,
    job_id: &str,
    chunk_id: Option<&str>,
    status: JobStatus,
) -> Result<()> {
    store
        .update_status(job_id, chunk_id, status)
        .await
        .map_err(JobError::StatusWrite)
}

/// Count one more attempt; returns the new total.
pub async fn increment_attempts<S: JobStore + ?Sized>(
    store: &S,
    job_id: &str,
    chunk_id: Option<&str>,
) -> Result<u32> {
    store
        .increment_attempts(job_id, chunk_id)
        .await
        .map_err(JobError::StatusWrite)
}

/// Live rows for `job_id` in chunk order.
pub async fn get_job_chunks<S: JobStore + ?Sized>(store: &S, job_id: &str) -> Result<Vec<Job>> {
    store.get_chunks(job_id).await.map_err(JobError::Store)
}
