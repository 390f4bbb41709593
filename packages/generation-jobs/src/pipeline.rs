//! End-to-end runs: get-or-create, retry, and chunk fan-out.
//!
//! `JobRunner` ties the pieces together for callers that just want a result
//! for an input. Inputs over the chunk budget are split at scene headings
//! and each chunk becomes its own job row under the shared `job_id`.

use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::chunker::{is_scene_heading, needs_chunking, Chunk, Chunker};
use crate::error::{JobError, RunError};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::traits::generator::{GenerationRequest, Generator};
use crate::traits::store::JobStore;
use crate::types::config::RetryConfig;
use crate::types::job::{Job, JobStatus};

/// Result of running one job row.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Row that produced the result (another job's row on a cache hit)
    pub job: Job,
    pub result: Value,
    pub cached: bool,
}

/// One chunk's outcome within a chunked run.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    /// `None` when the input fit in a single unit
    pub chunk: Option<Chunk>,
    pub outcome: JobOutcome,
}

/// Ordered outcomes of [`JobRunner::run_chunked`].
#[derive(Debug, Clone)]
pub struct ChunkedOutcome {
    pub job_id: String,
    pub chunks: Vec<ChunkResult>,
}

impl ChunkedOutcome {
    /// Results in chunk order, ready for reassembly.
    pub fn results(&self) -> impl Iterator<Item = &Value> {
        self.chunks.iter().map(|c| &c.outcome.result)
    }

    /// Chunks served from the cache.
    pub fn cached_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.outcome.cached).count()
    }
}

/// Status counts for the live rows of one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkProgress {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ChunkProgress {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        jobs.into_iter().fold(Self::default(), |mut acc, job| {
            acc.total += 1;
            match job.status {
                JobStatus::Pending => acc.pending += 1,
                JobStatus::Processing => acc.processing += 1,
                JobStatus::Completed { .. } => acc.completed += 1,
                JobStatus::Failed { .. } => acc.failed += 1,
            }
            acc
        })
    }

    /// Whether every row reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.completed + self.failed == self.total
    }
}

/// Runs generation work against a store and a generator.
pub struct JobRunner<S, G> {
    executor: RetryExecutor<S>,
    generator: Arc<G>,
    config: RetryConfig,
    is_boundary: fn(&str) -> bool,
}

impl<S: JobStore, G: Generator> JobRunner<S, G> {
    pub fn new(store: Arc<S>, generator: Arc<G>, config: RetryConfig) -> Self {
        let policy = RetryPolicy::new(config.clone());
        Self {
            executor: RetryExecutor::new(store, policy),
            generator,
            config,
            is_boundary: is_scene_heading,
        }
    }

    /// Use a different structural boundary when chunking.
    pub fn with_boundary(mut self, is_boundary: fn(&str) -> bool) -> Self {
        self.is_boundary = is_boundary;
        self
    }

    pub fn executor(&self) -> &RetryExecutor<S> {
        &self.executor
    }

    pub fn store(&self) -> &Arc<S> {
        self.executor.store()
    }

    pub fn generator(&self) -> &Arc<G> {
        &self.generator
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Produce a result for one unit of work.
    ///
    /// Identical input already completed anywhere is returned without a
    /// model call.
    #[instrument(name = "generation.run", skip(self, input), fields(input_chars = input.len()))]
    pub async fn run(
        &self,
        job_id: &str,
        chunk_id: Option<&str>,
        job_type: &str,
        input: &str,
        model: &str,
    ) -> Result<JobOutcome, RunError> {
        let lookup = self
            .store()
            .get_or_create(job_id, chunk_id, job_type, input.as_bytes())
            .await?;

        if lookup.cached {
            if let Some(result) = lookup.job.result().cloned() {
                debug!(source_job = %lookup.job.job_id, "Serving cached result");
                return Ok(JobOutcome {
                    job: lookup.job,
                    result,
                    cached: true,
                });
            }
        }

        let generator = &self.generator;
        let result = self
            .executor
            .with_retry(
                job_id,
                chunk_id,
                model,
                self.config.default_chunk_size,
                |attempt| async move {
                    let request = GenerationRequest {
                        job_type,
                        input,
                        attempt: &attempt,
                    };
                    generator.generate(&request).await
                },
            )
            .await?;

        let job = self
            .store()
            .find_live(job_id, chunk_id)
            .await
            .map_err(JobError::Store)?
            .unwrap_or(lookup.job);

        Ok(JobOutcome {
            job,
            result,
            cached: false,
        })
    }

    /// Run `text` as one unit, or as one job per chunk when it is too long.
    ///
    /// Chunks run with up to `chunk_concurrency` in flight and come back in
    /// chunk order. The first chunk to fail terminally aborts the run;
    /// chunks that already completed stay cached for the next attempt.
    #[instrument(name = "generation.run_chunked", skip(self, text), fields(text_chars = text.len()))]
    pub async fn run_chunked(
        &self,
        job_id: &str,
        job_type: &str,
        text: &str,
        model: &str,
    ) -> Result<ChunkedOutcome, RunError> {
        let max_chars = self.config.default_chunk_size;

        if !needs_chunking(text, max_chars) {
            let outcome = self.run(job_id, None, job_type, text, model).await?;
            return Ok(ChunkedOutcome {
                job_id: job_id.to_string(),
                chunks: vec![ChunkResult {
                    chunk: None,
                    outcome,
                }],
            });
        }

        let chunks = Chunker::with_boundary(max_chars, self.is_boundary).chunk(text);
        info!(chunk_count = chunks.len(), max_chars, "Split input into chunks");

        let results: Vec<ChunkResult> = stream::iter(chunks)
            .map(|chunk| async move {
                let outcome = self
                    .run(job_id, Some(&chunk.chunk_id), job_type, &chunk.text, model)
                    .await?;
                Ok::<_, RunError>(ChunkResult {
                    chunk: Some(chunk),
                    outcome,
                })
            })
            .buffered(self.config.chunk_concurrency.max(1))
            .try_collect()
            .await?;

        Ok(ChunkedOutcome {
            job_id: job_id.to_string(),
            chunks: results,
        })
    }

    /// Status counts across the live rows of `job_id`.
    pub async fn progress(&self, job_id: &str) -> Result<ChunkProgress, JobError> {
        let jobs = self
            .store()
            .get_chunks(job_id)
            .await
            .map_err(JobError::Store)?;
        Ok(ChunkProgress::from_jobs(&jobs))
    }
}
