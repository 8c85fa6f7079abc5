//! Batch dispatcher: provider submission and handle binding.

use std::sync::Arc;

use nexar_hal::{ProviderRegistry, Task};
use tracing::{debug, error, info};

use crate::ledger::{JobLedger, Transition};
use crate::submission::{JobStatus, JobSubmission};

/// Dispatches homogeneous batches of QUEUED submissions to a provider and
/// binds the returned handles back onto the submissions.
pub struct BatchDispatcher {
    registry: Arc<ProviderRegistry>,
    ledger: Arc<JobLedger>,
}

impl BatchDispatcher {
    /// Create a dispatcher.
    pub fn new(registry: Arc<ProviderRegistry>, ledger: Arc<JobLedger>) -> Self {
        Self { registry, ledger }
    }

    /// Dispatch a batch sharing one `(provider, device, shots)` triple.
    ///
    /// Source-code submissions are executed one-by-one through
    /// `execute_code`; the remaining tasks go through a single
    /// `execute_batch` call. Background dispatch errors never surface to the
    /// original caller; they are captured on the submissions and emitted as
    /// FAILED events.
    pub async fn dispatch(&self, batch: Vec<JobSubmission>) {
        let Some(first) = batch.first() else {
            return;
        };
        let provider_name = first.request.provider.clone();
        let device = first.request.device.clone();
        let shots = first.request.shots;

        let provider = match self.registry.get(&provider_name) {
            Ok(provider) => provider,
            Err(e) => {
                self.fail_all(&batch, &e.to_string()).await;
                return;
            }
        };

        let (source_jobs, task_jobs): (Vec<_>, Vec<_>) =
            batch.into_iter().partition(JobSubmission::is_source_code);

        for sub in &source_jobs {
            let source = sub
                .request
                .task
                .source()
                .expect("partitioned as source code");
            match provider
                .execute_code(source, &device, sub.request.shots)
                .await
            {
                Ok(provider_job_id) => {
                    self.mark_submitted(sub, provider_job_id).await;
                }
                Err(e) => {
                    error!(job_id = %sub.id, "source execution failed: {e}");
                    self.mark_failed(sub, &e.to_string()).await;
                }
            }
        }

        if task_jobs.is_empty() {
            return;
        }

        let tasks: Vec<Task> = task_jobs.iter().map(|sub| sub.request.task.clone()).collect();
        match provider.execute_batch(&tasks, &device, shots).await {
            Ok(provider_job_ids) => {
                if provider_job_ids.len() != task_jobs.len() {
                    let message = format!(
                        "provider '{}' returned {} ids for {} tasks",
                        provider_name,
                        provider_job_ids.len(),
                        task_jobs.len()
                    );
                    error!("{message}");
                    self.fail_all(&task_jobs, &message).await;
                    return;
                }
                for (sub, provider_job_id) in task_jobs.iter().zip(provider_job_ids) {
                    self.mark_submitted(sub, provider_job_id).await;
                }
                info!(
                    provider = %provider_name,
                    device = %device,
                    count = task_jobs.len(),
                    "batch submitted"
                );
            }
            Err(e) => {
                error!(
                    provider = %provider_name,
                    device = %device,
                    "batch execution failed: {e}"
                );
                self.fail_all(&task_jobs, &e.to_string()).await;
            }
        }
    }

    async fn mark_submitted(&self, sub: &JobSubmission, id: nexar_hal::ProviderJobId) {
        let transition = Transition::to(JobStatus::Submitted).with_provider_job_id(id);
        if let Err(e) = self.ledger.apply(&sub.id, transition).await {
            // A concurrent cancel can make this transition illegal; the
            // provider-side job then runs without a bound handle.
            debug!(job_id = %sub.id, "could not mark submitted: {e}");
        }
    }

    async fn mark_failed(&self, sub: &JobSubmission, message: &str) {
        let transition = Transition::to(JobStatus::Failed).with_error(message);
        if let Err(e) = self.ledger.apply(&sub.id, transition).await {
            debug!(job_id = %sub.id, "could not mark failed: {e}");
        }
    }

    async fn fail_all(&self, batch: &[JobSubmission], message: &str) {
        for sub in batch {
            self.mark_failed(sub, message).await;
        }
    }
}
