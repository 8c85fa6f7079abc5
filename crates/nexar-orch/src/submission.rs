//! Job types for the orchestrator.
//!
//! The job lifecycle:
//!
//! ```text
//! PENDING ──► SCHEDULED ──► QUEUED ──► SUBMITTED ──► COMPLETED
//!    │    └─► QUEUED_UNAVAILABLE ─► QUEUED
//!    └──────► QUEUED (⇄ QUEUED_UNAVAILABLE)
//!
//! FAILED    from PENDING (admission), QUEUED (dispatch), SUBMITTED
//! CANCELLED from SCHEDULED, QUEUED_UNAVAILABLE, QUEUED, SUBMITTED
//! ```
//!
//! **Invariants:**
//! - `PENDING` is transient; it exists only inside admission.
//! - Terminal states (`COMPLETED`, `FAILED`, `CANCELLED`) are permanent.
//! - `provider_job_id` is set iff the job has reached `SUBMITTED`.
//! - All transitions go through [`JobStatus::can_transition_to`].

use chrono::{DateTime, Utc};
use nexar_hal::{ProviderJobId, Task};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an orchestrated job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    /// Bypass batching; dispatch immediately.
    High,
    /// Batch with other submissions to the same provider/device.
    Standard,
}

/// Batching strategy for STANDARD submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationStrategy {
    /// Dispatch as soon as the short wait cap elapses (smaller batches).
    Time,
    /// Wait longer to grow batches (fewer provider calls).
    Cost,
}

/// Key identifying one pending-jobs queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    /// Provider name.
    pub provider: String,
    /// Device name.
    pub device: String,
}

impl BatchKey {
    /// Create a batch key.
    pub fn new(provider: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            device: device.into(),
        }
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.provider, self.device)
    }
}

/// Status of an orchestrated job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Admission in progress; never observable after `submit` returns.
    Pending,
    /// Waiting for its scheduled fire time.
    Scheduled,
    /// Parked because the target device is unavailable.
    QueuedUnavailable,
    /// Waiting in a batch queue or being dispatched.
    Queued,
    /// Handed to the provider; `provider_job_id` is set.
    Submitted,
    /// Finished successfully; a result is available.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
    /// Not a stored state: returned for ids the orchestrator cannot resolve.
    Unknown,
}

impl JobStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the lifecycle graph permits moving to `next`.
    ///
    /// `Queued -> QueuedUnavailable` covers scheduled jobs that fire into an
    /// unavailable device and are re-routed with their admission-time
    /// `queue_if_unavailable` flag.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Pending, QueuedUnavailable)
                | (Pending, Queued)
                | (Pending, Failed)
                | (Scheduled, Queued)
                | (Scheduled, Cancelled)
                | (QueuedUnavailable, Queued)
                | (QueuedUnavailable, Cancelled)
                | (Queued, QueuedUnavailable)
                | (Queued, Submitted)
                | (Queued, Failed)
                | (Queued, Cancelled)
                | (Submitted, Completed)
                | (Submitted, Failed)
                | (Submitted, Cancelled)
        )
    }

    /// Wire name of the status.
    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::QueuedUnavailable => "QUEUED_UNAVAILABLE",
            JobStatus::Queued => "QUEUED",
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A request to execute a task. Immutable once admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// The task payload.
    pub task: Task,
    /// Target provider name.
    pub provider: String,
    /// Target device name.
    pub device: String,
    /// Number of shots.
    pub shots: u32,
    /// Priority class.
    pub priority: JobPriority,
    /// Batching strategy.
    pub strategy: OptimizationStrategy,
}

impl JobRequest {
    /// Create a request with default priority and strategy.
    pub fn new(task: Task, provider: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            task,
            provider: provider.into(),
            device: device.into(),
            shots: 1024,
            priority: JobPriority::High,
            strategy: OptimizationStrategy::Time,
        }
    }

    /// Set the number of shots.
    pub fn with_shots(mut self, shots: u32) -> Self {
        self.shots = shots;
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the batching strategy.
    pub fn with_strategy(mut self, strategy: OptimizationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The batch key this request maps to.
    pub fn batch_key(&self) -> BatchKey {
        BatchKey::new(self.provider.clone(), self.device.clone())
    }
}

/// Admission-time options.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Execute no earlier than this wall-clock time.
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Park the job instead of failing when the device is unavailable.
    pub queue_if_unavailable: bool,
}

impl SubmitOptions {
    /// Schedule for a future time.
    pub fn at(scheduled_time: DateTime<Utc>) -> Self {
        Self {
            scheduled_time: Some(scheduled_time),
            ..Default::default()
        }
    }

    /// Park the job when the device is unavailable.
    pub fn queue_if_unavailable(mut self) -> Self {
        self.queue_if_unavailable = true;
        self
    }
}

/// The authoritative record of one admitted job.
///
/// Owned exclusively by the job store; every component mutates submissions
/// only through store transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Orchestrator job id.
    pub id: JobId,
    /// The admitted request.
    pub request: JobRequest,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Admission timestamp.
    pub created_at: DateTime<Utc>,
    /// Scheduled fire time, if admitted with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Whether the job parks instead of failing on an unavailable device.
    #[serde(default)]
    pub queue_if_unavailable: bool,
    /// Provider handle; set when the job reaches `SUBMITTED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_job_id: Option<ProviderJobId>,
    /// Last error recorded on the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSubmission {
    /// Create a new PENDING submission for a request.
    pub fn new(request: JobRequest, options: &SubmitOptions) -> Self {
        Self {
            id: JobId::new(),
            request,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            scheduled_time: options.scheduled_time,
            queue_if_unavailable: options.queue_if_unavailable,
            provider_job_id: None,
            error: None,
        }
    }

    /// The batch key this submission belongs to until SUBMITTED.
    pub fn batch_key(&self) -> BatchKey {
        self.request.batch_key()
    }

    /// Whether the payload is a source-code task.
    pub fn is_source_code(&self) -> bool {
        self.request.task.is_source_code()
    }
}

/// Row returned by the `list_scheduled` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJobInfo {
    /// Orchestrator job id.
    pub job_id: JobId,
    /// Target device.
    pub device: String,
    /// Scheduled fire time.
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Current status.
    pub status: JobStatus,
    /// Admission timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&JobSubmission> for ScheduledJobInfo {
    fn from(sub: &JobSubmission) -> Self {
        Self {
            job_id: sub.id,
            device: sub.request.device.clone(),
            scheduled_time: sub.scheduled_time,
            status: sub.status,
            created_at: sub.created_at,
        }
    }
}
