//! Generation Job Layer
//!
//! Durable bookkeeping, retry escalation and chunking for long-running AI
//! generation work.
//!
//! # Design Philosophy
//!
//! - One row per unit of work, keyed by `(job_id, chunk_id)`
//! - Identical input is generated once, whatever job asks for it
//! - Failures escalate: stricter output, then smaller chunks, then a cheaper model
//! - Status writes never decide the outcome of a generation
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use generation_jobs::{JobRunner, MemoryStore, RetryConfig};
//! use generation_jobs::testing::MockGenerator;
//!
//! let runner = JobRunner::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MockGenerator::new()),
//!     RetryConfig::from_env()?,
//! );
//!
//! let outcome = runner.run_chunked("J1", "screenplay", &script, "gpt-4o").await?;
//! for result in outcome.results() {
//!     println!("{}", result);
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (JobStore, Generator)
//! - [`types`] - Job rows and configuration
//! - [`retry`] - Retry decision ladder and executor
//! - [`chunker`] - Scene-aware text chunking
//! - [`pipeline`] - End-to-end runs over a store and a generator
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`testing`] - Mock implementations for testing

pub mod chunker;
pub mod error;
pub mod hasher;
pub mod jobs;
pub mod pipeline;
pub mod retry;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use chunker::{chunk_text, chunk_text_with, is_scene_heading, needs_chunking, Chunk, Chunker};
pub use error::{ConfigError, GenerationError, JobError, RunError, StoreError};
pub use hasher::{hash_input, hash_json};
pub use jobs::{get_job_chunks, get_or_create_job, increment_attempts, update_job_status};
pub use pipeline::{ChunkProgress, ChunkResult, ChunkedOutcome, JobOutcome, JobRunner};
pub use retry::{RetryContext, RetryExecutor, RetryPolicy};
pub use stores::MemoryStore;
pub use traits::{
    generator::{Attempt, GenerationRequest, Generator},
    store::{JobLookup, JobStore},
};
pub use types::{
    config::RetryConfig,
    job::{Job, JobStatus},
};

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;
