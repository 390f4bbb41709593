//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Local development
//! - Single-server deployments
//! - Testing with persistent data
//!
//! Both uniqueness invariants are enforced by partial unique indexes, so a
//! racing insert or a second completion of the same input fails in the
//! database rather than silently duplicating rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::JobStore;
use crate::types::job::{Job, JobStatus};

const COLUMNS: &str = "id, job_id, chunk_id, job_type, hash_input, status, result, \
                       error_detail, attempts, created_at, completed_at";

/// SQLite-based job store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite:./jobs.db?mode=rwc` - File-based, created if missing
    /// - `sqlite::memory:` - Ephemeral; use [`SqliteStore::in_memory`]
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Limited to one connection: every `:memory:` connection is its own
    /// database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generation_jobs (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                chunk_id TEXT,
                job_type TEXT NOT NULL,
                hash_input TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                result TEXT,
                error_detail TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                superseded_at TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_generation_jobs_live_key
                ON generation_jobs(job_id, COALESCE(chunk_id, ''))
                WHERE superseded_at IS NULL;

            CREATE UNIQUE INDEX IF NOT EXISTS idx_generation_jobs_completed_hash
                ON generation_jobs(hash_input)
                WHERE status = 'completed';

            CREATE INDEX IF NOT EXISTS idx_generation_jobs_job_id
                ON generation_jobs(job_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn require_live(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<Job> {
        self.find_live(job_id, chunk_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                job_id: job_id.to_string(),
                chunk_id: chunk_id.map(str::to_string),
            })
    }

    /// Persist status, payload columns and counters of an updated row.
    async fn save(&self, job: &Job) -> StoreResult<()> {
        let result = job.result().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = ?, result = ?, error_detail = ?, attempts = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(result)
        .bind(job.error_detail())
        .bind(i64::from(job.attempts))
        .bind(job.completed_at)
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateCompletedHash {
                    hash: job.hash_input.clone(),
                }
            } else {
                backend(e)
            }
        })?;

        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        let result = job.result().map(serde_json::to_string).transpose()?;

        sqlx::query(&format!(
            "INSERT INTO generation_jobs ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(job.id.to_string())
        .bind(&job.job_id)
        .bind(&job.chunk_id)
        .bind(&job.job_type)
        .bind(&job.hash_input)
        .bind(job.status.as_str())
        .bind(result)
        .bind(job.error_detail())
        .bind(i64::from(job.attempts))
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn find_live(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE job_id = ? AND chunk_id IS ? AND superseded_at IS NULL"
        ))
        .bind(job_id)
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(Job::try_from).transpose()
    }

    async fn find_completed_by_hash(&self, hash_input: &str) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE hash_input = ? AND status = 'completed' LIMIT 1"
        ))
        .bind(hash_input)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(Job::try_from).transpose()
    }

    async fn supersede(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE generation_jobs SET superseded_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn update_status(
        &self,
        job_id: &str,
        chunk_id: Option<&str>,
        status: JobStatus,
    ) -> StoreResult<()> {
        let mut job = self.require_live(job_id, chunk_id).await?;
        job.transition(status)?;
        self.save(&job).await
    }

    async fn increment_attempts(&self, job_id: &str, chunk_id: Option<&str>) -> StoreResult<u32> {
        let mut job = self.require_live(job_id, chunk_id).await?;
        let attempts = job.begin_attempt()?;
        self.save(&job).await?;
        Ok(attempts)
    }

    async fn get_chunks(&self, job_id: &str) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE job_id = ? AND superseded_at IS NULL \
             ORDER BY LENGTH(chunk_id), chunk_id"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(Job::try_from).collect()
    }
}

#[derive(FromRow)]
struct JobRow {
    id: String,
    job_id: String,
    chunk_id: Option<String>,
    job_type: String,
    hash_input: String,
    status: String,
    result: Option<String>,
    error_detail: Option<String>,
    attempts: i64,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> StoreResult<Self> {
        let status = match (row.status.as_str(), row.result, row.error_detail) {
            ("pending", _, _) => JobStatus::Pending,
            ("processing", _, _) => JobStatus::Processing,
            ("completed", Some(result), _) => JobStatus::Completed {
                result: serde_json::from_str(&result)?,
            },
            ("failed", _, error) => JobStatus::Failed {
                error: error.unwrap_or_default(),
            },
            (other, _, _) => {
                return Err(StoreError::Backend(
                    format!("unreadable status '{}' for job {}", other, row.id).into(),
                ))
            }
        };

        Ok(Job {
            id: Uuid::parse_str(&row.id).map_err(|e| StoreError::Backend(Box::new(e)))?,
            job_id: row.job_id,
            chunk_id: row.chunk_id,
            job_type: row.job_type,
            hash_input: row.hash_input,
            status,
            attempts: u32::try_from(row.attempts).map_err(|e| StoreError::Backend(Box::new(e)))?,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
