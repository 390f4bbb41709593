//! Drives a generation call through the retry ladder.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::JobError;
use crate::retry::policy::RetryPolicy;
use crate::traits::generator::Attempt;
use crate::traits::store::JobStore;
use crate::types::job::JobStatus;

/// Runs attempts sequentially, recording each one on the job row.
///
/// Status writes are best effort: a write the store rejects is logged and
/// the attempt's own outcome still decides whether to retry or return.
pub struct RetryExecutor<S> {
    store: Arc<S>,
    policy: RetryPolicy,
}

impl<S> Clone for RetryExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
        }
    }
}

impl<S: JobStore> RetryExecutor<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `generate` until it succeeds or the policy gives up.
    ///
    /// Returns the first successful value, or the error of the last attempt
    /// unchanged. The job row ends `completed` with the value or `failed`
    /// with that error's message.
    ///
    /// A completion the store rejects because another row already completed
    /// the same input leaves this row in `processing`; the value is still
    /// returned and the cache keeps serving it from the other row.
    #[instrument(name = "generation.with_retry", skip(self, generate))]
    pub async fn with_retry<F, Fut, E>(
        &self,
        job_id: &str,
        chunk_id: Option<&str>,
        initial_model: &str,
        initial_chunk_size: usize,
        mut generate: F,
    ) -> Result<Value, E>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<Value, E>>,
        E: Display,
    {
        let max_retries = self.policy.max_retries().max(1);
        let mut model = initial_model.to_string();
        let mut chunk_size = initial_chunk_size;
        let mut number = 1;

        loop {
            self.record(job_id, chunk_id, JobStatus::Processing).await;
            if let Err(e) = self.store.increment_attempts(job_id, chunk_id).await {
                warn!(error = %JobError::StatusWrite(e), "Failed to count attempt");
            }

            let attempt = Attempt {
                number,
                model: model.clone(),
                chunk_size,
                harden_output: number > 1,
            };
            info!(attempt = number, model = %model, chunk_size, "Starting generation attempt");

            let error = match generate(attempt).await {
                Ok(value) => {
                    self.record(
                        job_id,
                        chunk_id,
                        JobStatus::Completed {
                            result: value.clone(),
                        },
                    )
                    .await;
                    info!(attempt = number, "Generation completed");
                    return Ok(value);
                }
                Err(error) => error,
            };

            let next = self.policy.decide(number, &model, chunk_size, max_retries);

            // The attempt bound is checked here as well so the loop ends even
            // if the policy keeps asking for more.
            if !next.should_retry || number >= max_retries {
                warn!(attempt = number, error = %error, "Generation failed, giving up");
                self.record(
                    job_id,
                    chunk_id,
                    JobStatus::Failed {
                        error: error.to_string(),
                    },
                )
                .await;
                return Err(error);
            }

            warn!(
                attempt = number,
                error = %error,
                reason = %next.retry_reason,
                "Generation failed, retrying"
            );
            model = next.model;
            chunk_size = next.chunk_size;
            number = next.attempt;
        }
    }

    async fn record(&self, job_id: &str, chunk_id: Option<&str>, status: JobStatus) {
        let target = status.as_str();
        if let Err(e) = self.store.update_status(job_id, chunk_id, status).await {
            warn!(
                job_id,
                chunk_id,
                status = target,
                error = %JobError::StatusWrite(e),
                "Status write failed"
            );
        }
    }
}
