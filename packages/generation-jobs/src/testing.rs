//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the job layer
//! without making real model calls.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::{GenerationError, StoreError, StoreResult};
use crate::traits::generator::{Attempt, GenerationRequest, Generator};
use crate::traits::store::JobStore;
use crate::types::job::{Job, JobStatus};

/// A mock generator for testing.
///
/// Scripted outcomes are consumed one per call; once the script runs out
/// every call succeeds with `{"ok": true}` (or echoes the input in echo
/// mode). Inputs containing a registered substring always fail.
#[derive(Default)]
pub struct MockGenerator {
    /// Outcomes returned in order before falling back to the default
    script: Arc<RwLock<VecDeque<Result<Value, GenerationError>>>>,

    /// Substrings that make a call fail, with the error message
    failing_inputs: Arc<RwLock<Vec<(String, String)>>>,

    /// Fail every call with this message
    always_fail: Option<String>,

    /// Answer `{"text": input}` instead of `{"ok": true}`
    echo: bool,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockGeneratorCall>>>,
}

/// Record of a call made to the mock generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockGeneratorCall {
    pub job_type: String,
    pub input: String,
    pub attempt: Attempt,
}

impl MockGenerator {
    /// Create a new mock generator that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one outcome.
    pub fn with_outcome(self, outcome: Result<Value, GenerationError>) -> Self {
        self.script.write().unwrap().push_back(outcome);
        self
    }

    /// Fail the next `times` calls with `message`.
    pub fn fail_times(self, times: usize, message: &str) -> Self {
        {
            let mut script = self.script.write().unwrap();
            for _ in 0..times {
                script.push_back(Err(GenerationError::failed(message)));
            }
        }
        self
    }

    /// Fail every call.
    pub fn always_fail(mut self, message: impl Into<String>) -> Self {
        self.always_fail = Some(message.into());
        self
    }

    /// Fail any call whose input contains `needle`.
    pub fn with_failing_input(self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.failing_inputs
            .write()
            .unwrap()
            .push((needle.into(), message.into()));
        self
    }

    /// Answer with the input text so results can be matched to chunks.
    pub fn echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockGeneratorCall> {
        self.calls.read().unwrap().clone()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn outcome_for(&self, input: &str) -> Result<Value, GenerationError> {
        if let Some(message) = &self.always_fail {
            return Err(GenerationError::failed(message.clone()));
        }

        let failing = self
            .failing_inputs
            .read()
            .unwrap()
            .iter()
            .find(|(needle, _)| input.contains(needle.as_str()))
            .map(|(_, message)| message.clone());
        if let Some(message) = failing {
            return Err(GenerationError::failed(message));
        }

        if let Some(outcome) = self.script.write().unwrap().pop_front() {
            return outcome;
        }

        if self.echo {
            Ok(json!({ "text": input }))
        } else {
            Ok(json!({ "ok": true }))
        }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<Value, GenerationError> {
        self.calls.write().unwrap().push(MockGeneratorCall {
            job_type: request.job_type.to_string(),
            input: request.input.to_string(),
            attempt: request.attempt.clone(),
        });
        self.outcome_for(request.input)
    }
}

/// Store wrapper whose writes can be made to fail on demand.
///
/// Reads and inserts always pass through, so job creation keeps working
/// while status writes are broken.
pub struct FlakyStore<S> {
    inner: S,
    fail_writes: AtomicBool,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Start or stop failing `update_status` and `increment_attempts`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("status writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: JobStore> JobStore for FlakyStore<S> {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        self.inner.insert(job).await
    }

    async fn find_live(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<Option<Job>> {
        self.inner.find_live(job_id, chunk_id).await
    }

    async fn find_completed_by_hash(&self, hash_input: &str) -> StoreResult<Option<Job>> {
        self.inner.find_completed_by_hash(hash_input).await
    }

    async fn supersede(&self, id: Uuid) -> StoreResult<()> {
        self.inner.supersede(id).await
    }

    async fn update_status(
        &self,
        job_id: &str,
        chunk_id: Option<&str>,
        status: JobStatus,
    ) -> StoreResult<()> {
        self.check_write()?;
        self.inner.update_status(job_id, chunk_id, status).await
    }

    async fn increment_attempts(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<u32> {
        self.check_write()?;
        self.inner.increment_attempts(job_id, chunk_id).await
    }

    async fn get_chunks(&self, job_id: &str) -> StoreResult<Vec<Job>> {
        self.inner.get_chunks(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;

    fn attempt() -> Attempt {
        Attempt {
            number: 1,
            model: "gpt-4o".into(),
            chunk_size: 8000,
            harden_output: false,
        }
    }

    #[tokio::test]
    async fn test_mock_generator_script_then_default() {
        let generator = MockGenerator::new().fail_times(1, "rate limited");
        let attempt = attempt();
        let request = GenerationRequest {
            job_type: "t",
            input: "hello",
            attempt: &attempt,
        };

        assert_eq!(
            generator.generate(&request).await,
            Err(GenerationError::failed("rate limited"))
        );
        assert_eq!(generator.generate(&request).await, Ok(json!({"ok": true})));
        assert_eq!(generator.calls().len(), 2);
        assert_eq!(generator.calls()[0].input, "hello");
    }

    #[tokio::test]
    async fn test_flaky_store_blocks_writes_only() {
        let store = FlakyStore::new(MemoryStore::new());
        store.get_or_create("J1", None, "t", b"x").await.unwrap();
        store.set_fail_writes(true);

        assert!(store.increment_attempts("J1", None).await.is_err());
        assert!(store.find_live("J1", None).await.unwrap().is_some());

        store.set_fail_writes(false);
        assert_eq!(store.increment_attempts("J1", None).await.unwrap(), 1);
    }
}
