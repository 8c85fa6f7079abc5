//! Persistence layer for job state.
//!
//! The store exclusively owns the authoritative [`JobSubmission`] records.
//! Every lifecycle transition is persisted here before the corresponding
//! event is published or the next action is taken.

mod memory_store;
mod sqlite_store;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::OrchResult;
use crate::submission::{JobId, JobSubmission};

/// Trait for durable job storage with a time-indexed scheduled set.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upsert a submission. Atomic per job id.
    async fn put(&self, submission: &JobSubmission) -> OrchResult<()>;

    /// Load a submission by id.
    async fn get(&self, job_id: &JobId) -> OrchResult<Option<JobSubmission>>;

    /// Add a job to the scheduled index with its fire time.
    async fn add_scheduled(&self, job_id: &JobId, fire_at: DateTime<Utc>) -> OrchResult<()>;

    /// Remove a job from the scheduled index.
    async fn remove_scheduled(&self, job_id: &JobId) -> OrchResult<()>;

    /// Submissions whose fire time is at or before `now`, soonest first.
    async fn scheduled_due(&self, now: DateTime<Utc>) -> OrchResult<Vec<JobSubmission>>;

    /// All submissions currently in the scheduled index, soonest first.
    async fn list_scheduled(&self) -> OrchResult<Vec<JobSubmission>>;

    /// Load every stored submission. Invoked once at startup to rebuild
    /// in-memory indices.
    async fn load_all(&self) -> OrchResult<Vec<JobSubmission>>;

    /// Whether this store survives a process restart.
    fn is_durable(&self) -> bool;
}
