//! Transition ledger: the single write path for job state.
//!
//! Every status change goes through [`JobLedger::apply`], which serialises
//! writers per job id (lock shards keyed by id hash), checks the transition
//! against the lifecycle graph, persists the new state, and only then emits
//! the lifecycle event. A store failure aborts the transition before any
//! event is visible; a publish failure is logged and dropped.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nexar_hal::{JobResult, ProviderJobId};
use rustc_hash::FxHasher;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::error::{OrchError, OrchResult};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::store::JobStore;
use crate::submission::{JobId, JobStatus, JobSubmission};

const LOCK_SHARDS: usize = 16;

/// A requested transition with its event payload.
#[derive(Debug, Clone)]
pub struct Transition {
    status: JobStatus,
    reason: Option<String>,
    error: Option<String>,
    provider_job_id: Option<ProviderJobId>,
    result: Option<JobResult>,
}

impl Transition {
    /// Start a transition to `status`.
    pub fn to(status: JobStatus) -> Self {
        Self {
            status,
            reason: None,
            error: None,
            provider_job_id: None,
            result: None,
        }
    }

    /// Attach a human-readable reason to the event.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Record an error on the submission and the event.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Bind a provider handle to the submission.
    pub fn with_provider_job_id(mut self, id: ProviderJobId) -> Self {
        self.provider_job_id = Some(id);
        self
    }

    /// Carry a result payload on the event.
    pub fn with_result(mut self, result: JobResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// The write path for job state.
pub struct JobLedger {
    store: Arc<dyn JobStore>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
    locks: Vec<Mutex<()>>,
}

impl JobLedger {
    /// Create a ledger over a store and a publisher.
    pub fn new(
        store: Arc<dyn JobStore>,
        publisher: Arc<dyn EventPublisher>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            topic: topic.into(),
            locks: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Acquire the critical section for one job id.
    pub async fn lock(&self, job_id: &JobId) -> MutexGuard<'_, ()> {
        let mut hasher = FxHasher::default();
        job_id.hash(&mut hasher);
        let shard = (hasher.finish() as usize) % self.locks.len();
        self.locks[shard].lock().await
    }

    /// Persist a freshly-admitted PENDING submission. No event is emitted;
    /// events start with the first routing transition.
    pub async fn admit(&self, submission: &JobSubmission) -> OrchResult<()> {
        self.store.put(submission).await
    }

    /// Apply a transition under the job's critical section.
    pub async fn apply(&self, job_id: &JobId, transition: Transition) -> OrchResult<JobSubmission> {
        let _guard = self.lock(job_id).await;
        self.apply_locked(job_id, transition).await
    }

    /// Apply a transition with the job's critical section already held.
    pub async fn apply_locked(
        &self,
        job_id: &JobId,
        transition: Transition,
    ) -> OrchResult<JobSubmission> {
        let mut submission = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| OrchError::JobNotFound(job_id.to_string()))?;

        if !submission.status.can_transition_to(transition.status) {
            return Err(OrchError::IllegalTransition {
                from: submission.status.name().to_string(),
                to: transition.status.name().to_string(),
            });
        }

        submission.status = transition.status;
        if let Some(id) = transition.provider_job_id {
            submission.provider_job_id = Some(id);
        }
        if let Some(error) = &transition.error {
            submission.error = Some(error.clone());
        }

        // Persist before publishing; the store is the source of truth.
        self.store.put(&submission).await?;

        let mut event = LifecycleEvent::for_submission(&submission, transition.status);
        if let Some(reason) = transition.reason {
            event = event.with_reason(reason);
        }
        if let Some(result) = transition.result {
            event = event.with_result(result);
        }
        self.emit(&event).await;

        Ok(submission)
    }

    /// Publish an event, logging and dropping on failure.
    pub async fn emit(&self, event: &LifecycleEvent) {
        if let Err(e) = self.publisher.publish(&self.topic, event).await {
            warn!(
                job_id = %event.job_id,
                status = %event.status,
                "failed to publish lifecycle event: {e}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FailingPublisher, InMemoryBus};
    use crate::store::MemoryStore;
    use crate::submission::{JobRequest, SubmitOptions};
    use nexar_hal::Task;

    fn make_submission() -> JobSubmission {
        let request = JobRequest::new(
            Task::Circuit(serde_json::json!({})),
            "local",
            "local_sim",
        );
        JobSubmission::new(request, &SubmitOptions::default())
    }

    fn make_ledger(bus: Arc<InMemoryBus>) -> JobLedger {
        JobLedger::new(Arc::new(MemoryStore::new()), bus, "hal.jobs")
    }

    #[tokio::test]
    async fn test_apply_persists_and_emits() {
        let bus = Arc::new(InMemoryBus::default());
        let mut rx = bus.subscribe();
        let ledger = make_ledger(bus);

        let sub = make_submission();
        ledger.admit(&sub).await.unwrap();

        let updated = ledger
            .apply(&sub.id, Transition::to(JobStatus::Queued))
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Queued);

        let stored = ledger.store().get(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);

        let (_, event) = rx.recv().await.unwrap();
        assert_eq!(event.job_id, sub.id);
        assert_eq!(event.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let ledger = make_ledger(Arc::new(InMemoryBus::default()));
        let sub = make_submission();
        ledger.admit(&sub).await.unwrap();

        let err = ledger
            .apply(&sub.id, Transition::to(JobStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchError::IllegalTransition { .. }));

        // State unchanged after the rejected transition.
        let stored = ledger.store().get(&sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let ledger = make_ledger(Arc::new(InMemoryBus::default()));
        let err = ledger
            .apply(&JobId::new(), Transition::to(JobStatus::Queued))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_block() {
        let ledger = JobLedger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FailingPublisher),
            "hal.jobs",
        );
        let sub = make_submission();
        ledger.admit(&sub).await.unwrap();

        // The transition persists even though the publisher fails.
        let updated = ledger
            .apply(&sub.id, Transition::to(JobStatus::Queued))
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_provider_id_bound_on_submit() {
        let ledger = make_ledger(Arc::new(InMemoryBus::default()));
        let sub = make_submission();
        ledger.admit(&sub).await.unwrap();
        ledger
            .apply(&sub.id, Transition::to(JobStatus::Queued))
            .await
            .unwrap();

        let updated = ledger
            .apply(
                &sub.id,
                Transition::to(JobStatus::Submitted)
                    .with_provider_job_id(ProviderJobId::composite("base", 0)),
            )
            .await
            .unwrap();
        assert_eq!(
            updated.provider_job_id,
            Some(ProviderJobId::new("base:0"))
        );
    }
}
