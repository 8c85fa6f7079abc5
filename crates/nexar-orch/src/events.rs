//! Lifecycle event publication.
//!
//! Every persisted transition emits one [`LifecycleEvent`] to a named topic.
//! Delivery is at-least-once: a reconcile pass may re-emit a transition the
//! consumer has already seen. Publication must never block job progression:
//! failures are logged and the event is dropped; the authoritative state
//! lives in the job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexar_hal::{JobResult, ProviderJobId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{OrchError, OrchResult};
use crate::submission::{JobId, JobStatus, JobSubmission};

/// A message describing a single state transition of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Orchestrator job id.
    pub job_id: JobId,
    /// Provider handle, when the job has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_job_id: Option<ProviderJobId>,
    /// The status entered by this transition.
    pub status: JobStatus,
    /// Provider name.
    pub provider: String,
    /// Device name.
    pub device: String,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
    /// Scheduled fire time, for scheduled jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Error text, for FAILED transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Result payload, for COMPLETED transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Human-readable transition reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LifecycleEvent {
    /// Build an event for a submission entering `status`.
    pub fn for_submission(submission: &JobSubmission, status: JobStatus) -> Self {
        Self {
            job_id: submission.id,
            provider_job_id: submission.provider_job_id.clone(),
            status,
            provider: submission.request.provider.clone(),
            device: submission.request.device.clone(),
            timestamp: Utc::now(),
            scheduled_time: submission.scheduled_time,
            error: submission.error.clone(),
            result: None,
            reason: None,
        }
    }

    /// Attach a transition reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach a result payload.
    pub fn with_result(mut self, result: JobResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// Publisher of lifecycle events to an external bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event to a topic.
    async fn publish(&self, topic: &str, event: &LifecycleEvent) -> OrchResult<()>;
}

/// In-process event bus backed by a tokio broadcast channel.
///
/// Suitable for tests and single-node deployments where consumers run in
/// the same process.
pub struct InMemoryBus {
    sender: broadcast::Sender<(String, LifecycleEvent)>,
}

impl InMemoryBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all published events.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, LifecycleEvent)> {
        self.sender.subscribe()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for InMemoryBus {
    async fn publish(&self, topic: &str, event: &LifecycleEvent) -> OrchResult<()> {
        // A send error only means there are no subscribers; that is not a
        // publication failure.
        let _ = self.sender.send((topic.to_string(), event.clone()));
        Ok(())
    }
}

/// Publisher that writes events to the tracing log only.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, topic: &str, event: &LifecycleEvent) -> OrchResult<()> {
        tracing::info!(
            topic,
            job_id = %event.job_id,
            status = %event.status,
            provider = %event.provider,
            device = %event.device,
            "lifecycle event"
        );
        Ok(())
    }
}

/// Publisher that always fails (for tests of drop semantics).
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _event: &LifecycleEvent) -> OrchResult<()> {
        Err(OrchError::Internal("publisher unavailable".into()))
    }
}
