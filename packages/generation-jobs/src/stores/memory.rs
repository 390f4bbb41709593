//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::JobStore;
use crate::types::job::{Job, JobStatus};

struct Row {
    job: Job,
    superseded: bool,
}

/// In-memory storage for job rows.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    rows: RwLock<HashMap<Uuid, Row>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Number of rows, superseded ones included.
    pub fn job_count(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or_default()
    }

    /// Every row for a key, oldest first, superseded ones included.
    pub fn history(&self, job_id: &str, chunk_id: Option<&str>) -> Vec<Job> {
        let Ok(rows) = self.rows.read() else {
            return Vec::new();
        };
        let mut jobs: Vec<_> = rows
            .values()
            .filter(|r| r.job.has_key(job_id, chunk_id))
            .map(|r| r.job.clone())
            .collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<Uuid, Row>>> {
        self.rows
            .read()
            .map_err(|e| StoreError::Backend(e.to_string().into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<Uuid, Row>>> {
        self.rows
            .write()
            .map_err(|e| StoreError::Backend(e.to_string().into()))
    }
}

fn live_mut<'a>(
    rows: &'a mut HashMap<Uuid, Row>,
    job_id: &str,
    chunk_id: Option<&str>,
) -> StoreResult<&'a mut Job> {
    rows.values_mut()
        .find(|r| !r.superseded && r.job.has_key(job_id, chunk_id))
        .map(|r| &mut r.job)
        .ok_or_else(|| StoreError::NotFound {
            job_id: job_id.to_string(),
            chunk_id: chunk_id.map(str::to_string),
        })
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        let mut rows = self.write()?;
        let key_taken = rows.values().any(|r| {
            !r.superseded && r.job.has_key(&job.job_id, job.chunk_id.as_deref())
        });
        if key_taken {
            return Err(StoreError::Backend(
                format!("live job already exists for {}", job.job_id).into(),
            ));
        }
        rows.insert(
            job.id,
            Row {
                job: job.clone(),
                superseded: false,
            },
        );
        Ok(())
    }

    async fn find_live(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<Option<Job>> {
        Ok(self
            .read()?
            .values()
            .find(|r| !r.superseded && r.job.has_key(job_id, chunk_id))
            .map(|r| r.job.clone()))
    }

    async fn find_completed_by_hash(&self, hash_input: &str) -> StoreResult<Option<Job>> {
        Ok(self
            .read()?
            .values()
            .find(|r| r.job.is_completed() && r.job.hash_input == hash_input)
            .map(|r| r.job.clone()))
    }

    async fn supersede(&self, id: Uuid) -> StoreResult<()> {
        if let Some(row) = self.write()?.get_mut(&id) {
            row.superseded = true;
        }
        Ok(())
    }

    async fn update_status(
        &self,
        job_id: &str,
        chunk_id: Option<&str>,
        status: JobStatus,
    ) -> StoreResult<()> {
        let mut rows = self.write()?;

        if matches!(status, JobStatus::Completed { .. }) {
            let job = live_mut(&mut rows, job_id, chunk_id)?;
            let (id, hash) = (job.id, job.hash_input.clone());
            let duplicate = rows
                .values()
                .any(|r| r.job.id != id && r.job.is_completed() && r.job.hash_input == hash);
            if duplicate {
                return Err(StoreError::DuplicateCompletedHash { hash });
            }
        }

        live_mut(&mut rows, job_id, chunk_id)?.transition(status)
    }

    async fn increment_attempts(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<u32> {
        let mut rows = self.write()?;
        live_mut(&mut rows, job_id, chunk_id)?.begin_attempt()
    }

    async fn get_chunks(&self, job_id: &str) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<_> = self
            .read()?
            .values()
            .filter(|r| !r.superseded && r.job.job_id == job_id)
            .map(|r| r.job.clone())
            .collect();
        // Length first keeps C1000 after C999.
        jobs.sort_by(|a, b| {
            let key = |j: &Job| (j.chunk_id.as_ref().map(String::len), j.chunk_id.clone());
            key(a).cmp(&key(b))
        });
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunk;
    use crate::hasher::hash_input;
    use serde_json::json;

    async fn complete(store: &MemoryStore, job_id: &str, chunk_id: Option<&str>) {
        store.increment_attempts(job_id, chunk_id).await.unwrap();
        store
            .update_status(job_id, chunk_id, JobStatus::Completed { result: json!({"ok": true}) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_or_create_inserts_pending_row() {
        let store = MemoryStore::new();

        let lookup = store.get_or_create("J1", None, "screenplay", b"input").await.unwrap();

        assert!(!lookup.cached);
        assert_eq!(lookup.job.status, JobStatus::Pending);
        assert_eq!(lookup.job.attempts, 0);
        assert_eq!(store.job_count(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_resumes_open_row() {
        let store = MemoryStore::new();
        let first = store.get_or_create("J1", Some("C001"), "t", b"a").await.unwrap();
        store.increment_attempts("J1", Some("C001")).await.unwrap();

        let second = store.get_or_create("J1", Some("C001"), "t", b"a").await.unwrap();

        assert!(!second.cached);
        assert_eq!(second.job.id, first.job.id);
        assert_eq!(second.job.attempts, 1);
        assert_eq!(store.job_count(), 1);
    }

    #[tokio::test]
    async fn test_completed_hash_served_across_job_ids() {
        let store = MemoryStore::new();
        store.get_or_create("J1", None, "t", b"same").await.unwrap();
        complete(&store, "J1", None).await;

        let lookup = store.get_or_create("J2", None, "t", b"same").await.unwrap();

        assert!(lookup.cached);
        assert_eq!(lookup.job.job_id, "J1");
        assert_eq!(lookup.job.attempts, 1);
        assert_eq!(store.job_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_row_is_superseded() {
        let store = MemoryStore::new();
        let first = store.get_or_create("J1", None, "t", b"x").await.unwrap();
        store.increment_attempts("J1", None).await.unwrap();
        store
            .update_status("J1", None, JobStatus::Failed { error: "boom".into() })
            .await
            .unwrap();

        let second = store.get_or_create("J1", None, "t", b"x").await.unwrap();

        assert_ne!(second.job.id, first.job.id);
        assert_eq!(second.job.status, JobStatus::Pending);
        let history = store.history("J1", None);
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|j| j.error_detail() == Some("boom")));
    }

    #[tokio::test]
    async fn test_completed_row_with_other_input_is_superseded() {
        let store = MemoryStore::new();
        let first = store.get_or_create("J1", None, "t", b"draft A").await.unwrap();
        complete(&store, "J1", None).await;

        let second = store.get_or_create("J1", None, "t", b"draft B").await.unwrap();

        assert!(!second.cached);
        assert_ne!(second.job.id, first.job.id);
        assert_eq!(second.job.status, JobStatus::Pending);
        assert_eq!(second.job.hash_input, hash_input("draft B"));
        assert_eq!(store.history("J1", None).len(), 2);
    }

    #[tokio::test]
    async fn test_open_row_with_other_input_is_superseded() {
        let store = MemoryStore::new();
        let abandoned = store
            .get_or_create("J1", Some("C001"), "t", b"old text")
            .await
            .unwrap();
        store.increment_attempts("J1", Some("C001")).await.unwrap();

        let fresh = store
            .get_or_create("J1", Some("C001"), "t", b"new text")
            .await
            .unwrap();

        assert!(!fresh.cached);
        assert_ne!(fresh.job.id, abandoned.job.id);
        assert_eq!(fresh.job.hash_input, hash_input("new text"));
        assert_eq!(fresh.job.attempts, 0);

        store.increment_attempts("J1", Some("C001")).await.unwrap();
        store
            .update_status(
                "J1",
                Some("C001"),
                JobStatus::Completed {
                    result: json!("result for new text"),
                },
            )
            .await
            .unwrap();

        let old = store.get_or_create("J2", None, "t", b"old text").await.unwrap();
        assert!(!old.cached);
        let new = store.get_or_create("J3", None, "t", b"new text").await.unwrap();
        assert!(new.cached);
        assert_eq!(new.job.result(), Some(&json!("result for new text")));
    }

    #[tokio::test]
    async fn test_update_status_rejects_terminal_writes() {
        let store = MemoryStore::new();
        store.get_or_create("J1", None, "t", b"x").await.unwrap();
        complete(&store, "J1", None).await;

        let err = store
            .update_status("J1", None, JobStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert!(store.increment_attempts("J1", None).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_completed_hash_rejected() {
        let store = MemoryStore::new();
        store.get_or_create("J1", Some("C001"), "t", b"dup").await.unwrap();
        store.get_or_create("J1", Some("C002"), "t", b"dup").await.unwrap();
        complete(&store, "J1", Some("C001")).await;
        store.increment_attempts("J1", Some("C002")).await.unwrap();

        let err = store
            .update_status("J1", Some("C002"), JobStatus::Completed { result: json!(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCompletedHash { .. }));
    }

    #[tokio::test]
    async fn test_get_chunks_ordered() {
        let store = MemoryStore::new();
        for chunk in ["C003", "C001", "C002"] {
            store
                .get_or_create("J1", Some(chunk), "t", chunk.as_bytes())
                .await
                .unwrap();
        }
        store.get_or_create("J2", Some("C001"), "t", b"other").await.unwrap();

        let chunks = store.get_chunks("J1").await.unwrap();
        let ids: Vec<_> = chunks.iter().filter_map(|j| j.chunk_id.as_deref()).collect();
        assert_eq!(ids, ["C001", "C002", "C003"]);
    }

    #[tokio::test]
    async fn test_get_chunks_numeric_past_999() {
        let store = MemoryStore::new();
        for index in [999, 99, 100, 1000, 998] {
            let chunk_id = Chunk::id_for(index);
            store
                .get_or_create("J1", Some(chunk_id.as_str()), "t", chunk_id.as_bytes())
                .await
                .unwrap();
        }

        let chunks = store.get_chunks("J1").await.unwrap();
        let ids: Vec<_> = chunks.iter().filter_map(|j| j.chunk_id.as_deref()).collect();
        assert_eq!(ids, ["C100", "C101", "C999", "C1000", "C1001"]);
    }

    #[tokio::test]
    async fn test_missing_row_is_not_found() {
        let store = MemoryStore::new();
        let err = store.increment_attempts("nope", None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
