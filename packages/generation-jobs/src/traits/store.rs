//! Durable job record storage.
//!
//! Backends implement a handful of record primitives; the idempotent
//! get-or-create flow is built on top of them as a provided method so every
//! backend follows the same lookup order.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{JobError, Result, StoreResult};
use crate::hasher::hash_input;
use crate::types::job::{Job, JobStatus};

/// Outcome of [`JobStore::get_or_create`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobLookup {
    pub job: Job,

    /// True when served from a completed job with the same input hash
    pub cached: bool,
}

/// Store for generation job rows.
///
/// At most one live (non-superseded) row exists per `(job_id, chunk_id)`,
/// and at most one completed row per `hash_input`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new row atomically.
    async fn insert(&self, job: &Job) -> StoreResult<()>;

    /// Live row for a key, in any status.
    async fn find_live(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<Option<Job>>;

    /// Completed row holding this input hash.
    async fn find_completed_by_hash(&self, hash_input: &str) -> StoreResult<Option<Job>>;

    /// Retire a row so a fresh one can take its key.
    async fn supersede(&self, id: Uuid) -> StoreResult<()>;

    /// Move the live row for a key to `status`.
    ///
    /// Rejects edges outside the state machine and sets `completed_at` on
    /// entry into a terminal state.
    async fn update_status(
        &self,
        job_id: &str,
        chunk_id: Option<&str>,
        status: JobStatus,
    ) -> StoreResult<()>;

    /// Add one attempt to the live row and mark it processing.
    ///
    /// Returns the new attempt count. Not safe against two workers driving
    /// the same key at once.
    async fn increment_attempts(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<u32>;

    /// Live rows for a job ordered by `chunk_id`.
    async fn get_chunks(&self, job_id: &str) -> StoreResult<Vec<Job>>;

    /// Return a cached completed job, resume an open one, or create a new one.
    ///
    /// 1. A completed row with the same input hash (under any `job_id`) is
    ///    returned with `cached = true`.
    /// 2. A live `pending`/`processing` row for the key with the same input
    ///    hash is resumed.
    /// 3. Any other live row for the key (terminal, or open under a different
    ///    input) is superseded, then
    /// 4. a fresh `pending` row is inserted.
    async fn get_or_create(
        &self,
        job_id: &str,
        chunk_id: Option<&str>,
        job_type: &str,
        input_data: &[u8],
    ) -> Result<JobLookup> {
        let hash = hash_input(input_data);

        if let Some(job) = self
            .find_completed_by_hash(&hash)
            .await
            .map_err(JobError::Creation)?
        {
            tracing::debug!(job_id, chunk_id, hash = %hash, cached_from = %job.job_id, "Cache hit");
            return Ok(JobLookup { job, cached: true });
        }

        if let Some(existing) = self
            .find_live(job_id, chunk_id)
            .await
            .map_err(JobError::Creation)?
        {
            if !existing.status.is_terminal() && existing.hash_input == hash {
                return Ok(JobLookup {
                    job: existing,
                    cached: false,
                });
            }
            tracing::info!(
                job_id,
                chunk_id,
                previous = %existing.status,
                input_changed = existing.hash_input != hash,
                "Superseding job row"
            );
            self.supersede(existing.id)
                .await
                .map_err(JobError::Creation)?;
        }

        let job = Job::new(job_id, chunk_id.map(str::to_string), job_type, hash);
        self.insert(&job).await.map_err(JobError::Creation)?;
        Ok(JobLookup { job, cached: false })
    }
}
