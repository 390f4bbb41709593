//! Job record and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle of a job row.
///
/// `Pending -> Processing -> {Completed | Failed}`. `Processing` may repeat
/// across retries. Terminal states carry their payload so a completed job
/// without a result cannot be represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed { result: Value },
    Failed { error: String },
}

impl JobStatus {
    /// Name used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }

    /// Whether no further status writes may occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }

    /// Whether `next` is a legal edge from this state.
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed { .. })
                | (JobStatus::Processing, JobStatus::Failed { .. })
        )
    }

    /// Check the edge, returning the store error the backends report.
    pub fn check_transition(&self, next: &JobStatus) -> Result<(), StoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Cached result, present only when completed.
    pub fn result(&self) -> Option<&Value> {
        match self {
            JobStatus::Completed { result } => Some(result),
            _ => None,
        }
    }

    /// Last error, present only when failed.
    pub fn error_detail(&self) -> Option<&str> {
        match self {
            JobStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job
// ============================================================================

/// One unit of schedulable generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,

    /// Caller-supplied grouping key (one generation run)
    pub job_id: String,

    /// Sub-unit within `job_id`; `None` means the whole job is one unit
    pub chunk_id: Option<String>,

    /// Kind of work, for observability only
    pub job_type: String,

    /// Digest of the input payload
    pub hash_input: String,

    #[serde(flatten)]
    pub status: JobStatus,

    /// Generation attempts made so far
    pub attempts: u32,

    pub created_at: DateTime<Utc>,

    /// Set on entry into `completed` or `failed`
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a fresh pending job.
    pub fn new(
        job_id: impl Into<String>,
        chunk_id: Option<String>,
        job_type: impl Into<String>,
        hash_input: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id: job_id.into(),
            chunk_id,
            job_type: job_type.into(),
            hash_input: hash_input.into(),
            status: JobStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether this row matches the `(job_id, chunk_id)` key.
    pub fn has_key(&self, job_id: &str, chunk_id: Option<&str>) -> bool {
        self.job_id == job_id && self.chunk_id.as_deref() == chunk_id
    }

    /// Cached result, present only when completed.
    pub fn result(&self) -> Option<&Value> {
        self.status.result()
    }

    /// Last error, present only when failed.
    pub fn error_detail(&self) -> Option<&str> {
        self.status.error_detail()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, JobStatus::Completed { .. })
    }

    /// Apply a validated transition, stamping `completed_at` on terminal entry.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), StoreError> {
        self.status.check_transition(&next)?;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }

    /// Count one more attempt and move into `processing`.
    pub fn begin_attempt(&mut self) -> Result<u32, StoreError> {
        self.transition(JobStatus::Processing)?;
        self.attempts += 1;
        Ok(self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> Job {
        Job::new("J1", Some("C001".to_string()), "screenplay", "abc")
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.result().is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_legal_path_to_completed() {
        let mut job = job();
        assert_eq!(job.begin_attempt().unwrap(), 1);
        assert_eq!(job.begin_attempt().unwrap(), 2);
        job.transition(JobStatus::Completed { result: json!({"ok": true}) })
            .unwrap();

        assert_eq!(job.result(), Some(&json!({"ok": true})));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_reject_writes() {
        let mut job = job();
        job.begin_attempt().unwrap();
        job.transition(JobStatus::Failed { error: "boom".into() }).unwrap();

        let err = job.transition(JobStatus::Processing).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { from: "failed", to: "processing" }
        ));
        assert!(job.begin_attempt().is_err());
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error_detail(), Some("boom"));
    }

    #[test]
    fn test_pending_cannot_skip_processing() {
        let mut job = job();
        assert!(job
            .transition(JobStatus::Completed { result: json!(null) })
            .is_err());
        assert!(job.transition(JobStatus::Pending).is_err());
    }

    #[test]
    fn test_status_serializes_with_tag() {
        let status = JobStatus::Failed { error: "rate limited".into() };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"status": "failed", "error": "rate limited"})
        );
    }
}
