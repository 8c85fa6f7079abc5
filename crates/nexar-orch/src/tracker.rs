//! Status tracker: pull-based reconciliation with providers.

use std::sync::Arc;
use std::time::Duration;

use nexar_hal::{JobResult, ProviderJobStatus, ProviderRegistry};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{OrchError, OrchResult};
use crate::ledger::{JobLedger, Transition};
use crate::queues::BatchQueues;
use crate::submission::{JobId, JobStatus};

/// Reconciles local job state with providers on demand and serves
/// cancellation.
pub struct StatusTracker {
    registry: Arc<ProviderRegistry>,
    ledger: Arc<JobLedger>,
    queues: Arc<BatchQueues>,
}

impl StatusTracker {
    /// Create a tracker.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        ledger: Arc<JobLedger>,
        queues: Arc<BatchQueues>,
    ) -> Self {
        Self {
            registry,
            ledger,
            queues,
        }
    }

    /// Map a provider-reported status onto the local lifecycle.
    ///
    /// `Queued`/`Running` on the provider both correspond to the local
    /// `SUBMITTED` state. `Unknown` falls back to local state, covering
    /// composite ids the provider cannot resolve.
    fn reconciled(remote: ProviderJobStatus) -> Option<JobStatus> {
        match remote {
            ProviderJobStatus::Completed => Some(JobStatus::Completed),
            ProviderJobStatus::Failed => Some(JobStatus::Failed),
            ProviderJobStatus::Cancelled => Some(JobStatus::Cancelled),
            ProviderJobStatus::Queued
            | ProviderJobStatus::Running
            | ProviderJobStatus::Unknown => None,
        }
    }

    async fn bounded<T>(
        deadline: Option<Duration>,
        fut: impl std::future::Future<Output = nexar_hal::HalResult<T>>,
    ) -> OrchResult<nexar_hal::HalResult<T>> {
        match deadline {
            Some(limit) => timeout(limit, fut)
                .await
                .map_err(|_| OrchError::DeadlineExpired("provider call timed out".into())),
            None => Ok(fut.await),
        }
    }

    /// Current status of a job, reconciled with the provider when the job
    /// has been submitted.
    ///
    /// Terminal states are served locally without a provider call. Unknown
    /// job ids return [`JobStatus::Unknown`]. A deadline expiry returns a
    /// transient error without mutating state.
    pub async fn get_status(
        &self,
        job_id: &JobId,
        deadline: Option<Duration>,
    ) -> OrchResult<JobStatus> {
        let Some(sub) = self.ledger.store().get(job_id).await? else {
            return Ok(JobStatus::Unknown);
        };

        if sub.status.is_terminal() {
            return Ok(sub.status);
        }
        let Some(provider_job_id) = sub.provider_job_id.clone() else {
            return Ok(sub.status);
        };

        let provider = match self.registry.get(&sub.request.provider) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(job_id = %job_id, "provider missing during reconcile: {e}");
                return Ok(sub.status);
            }
        };

        let remote = match Self::bounded(deadline, provider.get_status(&provider_job_id)).await? {
            Ok(remote) => remote,
            Err(e) if e.is_transient() => return Err(OrchError::Provider(e)),
            Err(e) => {
                // Permanent provider failure: the job cannot make progress.
                self.ledger
                    .apply(
                        job_id,
                        Transition::to(JobStatus::Failed).with_error(e.to_string()),
                    )
                    .await?;
                return Ok(JobStatus::Failed);
            }
        };

        match Self::reconciled(remote) {
            Some(new_status) if new_status != sub.status => {
                let mut transition =
                    Transition::to(new_status).with_reason("provider status update");
                if new_status == JobStatus::Failed {
                    transition = transition.with_error("provider reported failure");
                }
                match self.ledger.apply(job_id, transition).await {
                    Ok(updated) => Ok(updated.status),
                    Err(OrchError::IllegalTransition { .. }) => {
                        // Lost a race with another transition; re-read.
                        let current = self.ledger.store().get(job_id).await?;
                        Ok(current.map_or(JobStatus::Unknown, |s| s.status))
                    }
                    Err(e) => Err(e),
                }
            }
            _ => Ok(sub.status),
        }
    }

    /// Result of a job, fetched from the provider once the job has been
    /// submitted. Returns `Ok(None)` while the job has not reached the
    /// provider yet.
    pub async fn get_result(
        &self,
        job_id: &JobId,
        deadline: Option<Duration>,
    ) -> OrchResult<Option<JobResult>> {
        let sub = self
            .ledger
            .store()
            .get(job_id)
            .await?
            .ok_or_else(|| OrchError::JobNotFound(job_id.to_string()))?;

        match sub.status {
            JobStatus::Pending
            | JobStatus::Scheduled
            | JobStatus::QueuedUnavailable
            | JobStatus::Queued => return Ok(None),
            JobStatus::Failed => {
                return Err(OrchError::Conflict(format!(
                    "job {} failed: {}",
                    job_id,
                    sub.error.as_deref().unwrap_or("unknown error")
                )));
            }
            JobStatus::Cancelled => {
                return Err(OrchError::Conflict(format!("job {job_id} was cancelled")));
            }
            JobStatus::Submitted | JobStatus::Completed => {}
            JobStatus::Unknown => {
                return Err(OrchError::JobNotFound(job_id.to_string()));
            }
        }

        let provider_job_id = sub.provider_job_id.clone().ok_or_else(|| {
            OrchError::Internal(format!("job {job_id} is submitted without a provider id"))
        })?;
        let provider = self.registry.get(&sub.request.provider)?;

        match Self::bounded(deadline, provider.get_result(&provider_job_id)).await? {
            Ok(result) => {
                if sub.status == JobStatus::Submitted {
                    let transition =
                        Transition::to(JobStatus::Completed).with_result(result.clone());
                    if let Err(e) = self.ledger.apply(job_id, transition).await {
                        debug!(job_id = %job_id, "could not mark completed: {e}");
                    }
                }
                Ok(Some(result))
            }
            Err(e) if e.is_transient() => Err(OrchError::Provider(e)),
            Err(e) => {
                self.ledger
                    .apply(
                        job_id,
                        Transition::to(JobStatus::Failed).with_error(e.to_string()),
                    )
                    .await?;
                Err(OrchError::Provider(e))
            }
        }
    }

    /// Cancel a job.
    ///
    /// SCHEDULED and QUEUED jobs are removed from their index or queue and
    /// cancelled in one atomic step. SUBMITTED jobs are cancelled locally
    /// with a best-effort provider-side cancel when the provider supports
    /// one. Cancelling a terminal job is a conflict.
    pub async fn cancel(&self, job_id: &JobId) -> OrchResult<bool> {
        let guard = self.ledger.lock(job_id).await;
        let sub = self
            .ledger
            .store()
            .get(job_id)
            .await?
            .ok_or_else(|| OrchError::JobNotFound(job_id.to_string()))?;

        match sub.status {
            JobStatus::Scheduled => {
                self.ledger.store().remove_scheduled(job_id).await?;
                self.ledger
                    .apply_locked(job_id, Transition::to(JobStatus::Cancelled))
                    .await?;
                Ok(true)
            }
            JobStatus::Queued | JobStatus::QueuedUnavailable => {
                self.queues.remove(&sub.batch_key(), job_id).await;
                self.ledger
                    .apply_locked(job_id, Transition::to(JobStatus::Cancelled))
                    .await?;
                Ok(true)
            }
            JobStatus::Submitted => {
                drop(guard);
                // Best-effort: providers without cancellation reject this
                // call and the job still cancels locally.
                if let (Some(provider_job_id), Ok(provider)) = (
                    sub.provider_job_id.clone(),
                    self.registry.get(&sub.request.provider),
                ) {
                    if let Err(e) = provider.cancel(&provider_job_id).await {
                        debug!(job_id = %job_id, "provider-side cancel not propagated: {e}");
                    }
                }
                match self
                    .ledger
                    .apply(job_id, Transition::to(JobStatus::Cancelled))
                    .await
                {
                    Ok(_) => Ok(true),
                    Err(OrchError::IllegalTransition { .. }) => Err(OrchError::Conflict(
                        format!("job {job_id} reached a terminal state before cancel"),
                    )),
                    Err(e) => Err(e),
                }
            }
            JobStatus::Pending => Err(OrchError::Conflict(format!(
                "job {job_id} is still in admission"
            ))),
            status if status.is_terminal() => Err(OrchError::Conflict(format!(
                "job {job_id} is already {status}"
            ))),
            _ => Err(OrchError::Internal(format!(
                "job {job_id} has unexpected status {}",
                sub.status
            ))),
        }
    }
}
