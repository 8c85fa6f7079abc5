//! Explicitly non-durable in-memory store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::{OrchError, OrchResult};
use crate::store::JobStore;
use crate::submission::{JobId, JobSubmission};

/// In-memory job store with reduced guarantees.
///
/// Selecting this store is an explicit constructor choice: non-terminal jobs
/// are lost on restart. Construction logs a warning so the degraded mode is
/// visible in operation.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    jobs: FxHashMap<JobId, JobSubmission>,
    // Scheduled index ordered by (fire time in microseconds, job id).
    scheduled: BTreeMap<(i64, JobId), ()>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        warn!("job store is in-memory; non-terminal jobs will be lost on restart");
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> OrchResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| OrchError::Store(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn put(&self, submission: &JobSubmission) -> OrchResult<()> {
        let mut inner = self.lock()?;
        inner.jobs.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> OrchResult<Option<JobSubmission>> {
        let inner = self.lock()?;
        Ok(inner.jobs.get(job_id).cloned())
    }

    async fn add_scheduled(&self, job_id: &JobId, fire_at: DateTime<Utc>) -> OrchResult<()> {
        let mut inner = self.lock()?;
        inner.scheduled.insert((fire_at.timestamp_micros(), *job_id), ());
        Ok(())
    }

    async fn remove_scheduled(&self, job_id: &JobId) -> OrchResult<()> {
        let mut inner = self.lock()?;
        inner.scheduled.retain(|(_, id), ()| id != job_id);
        Ok(())
    }

    async fn scheduled_due(&self, now: DateTime<Utc>) -> OrchResult<Vec<JobSubmission>> {
        let inner = self.lock()?;
        let cutoff = now.timestamp_micros();
        Ok(inner
            .scheduled
            .range(..=(cutoff, JobId(uuid::Uuid::max())))
            .filter_map(|((_, id), ())| inner.jobs.get(id).cloned())
            .collect())
    }

    async fn list_scheduled(&self) -> OrchResult<Vec<JobSubmission>> {
        let inner = self.lock()?;
        Ok(inner
            .scheduled
            .keys()
            .filter_map(|(_, id)| inner.jobs.get(id).cloned())
            .collect())
    }

    async fn load_all(&self) -> OrchResult<Vec<JobSubmission>> {
        let inner = self.lock()?;
        let mut jobs: Vec<_> = inner.jobs.values().cloned().collect();
        jobs.sort_by_key(|sub| sub.created_at);
        Ok(jobs)
    }

    fn is_durable(&self) -> bool {
        false
    }
}
