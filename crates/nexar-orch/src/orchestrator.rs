//! The orchestrator: composition root, admission, and scheduler loops.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nexar_hal::{DeviceDescriptor, JobResult, ProviderRegistry, Task};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::OrchConfig;
use crate::dispatcher::BatchDispatcher;
use crate::error::{OrchError, OrchResult};
use crate::events::EventPublisher;
use crate::ledger::{JobLedger, Transition};
use crate::queues::{BatchQueues, PendingJob};
use crate::store::{JobStore, MemoryStore, SqliteStore};
use crate::submission::{
    BatchKey, JobId, JobPriority, JobRequest, JobStatus, JobSubmission, ScheduledJobInfo,
    SubmitOptions,
};
use crate::tracker::StatusTracker;

/// The HAL job orchestrator.
///
/// Constructed once at startup with its provider registry, store, and event
/// publisher injected. [`start`](Self::start) spawns the batch monitor and
/// the time scheduler; callers drive `submit`, `status`, `result` and
/// `cancel` concurrently from their own tasks.
pub struct Orchestrator {
    config: OrchConfig,
    registry: Arc<ProviderRegistry>,
    queues: Arc<BatchQueues>,
    ledger: Arc<JobLedger>,
    dispatcher: BatchDispatcher,
    tracker: StatusTracker,
    shutdown: watch::Sender<bool>,
}

impl Orchestrator {
    /// Create an orchestrator over an explicit store and publisher.
    pub fn new(
        config: OrchConfig,
        registry: ProviderRegistry,
        store: Arc<dyn JobStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        if !store.is_durable() {
            info!("orchestrator persistence=ephemeral; jobs do not survive restart");
        }

        let registry = Arc::new(registry);
        let ledger = Arc::new(JobLedger::new(
            store,
            publisher,
            config.event_topic.clone(),
        ));
        let queues = Arc::new(BatchQueues::new());
        let dispatcher = BatchDispatcher::new(registry.clone(), ledger.clone());
        let tracker = StatusTracker::new(registry.clone(), ledger.clone(), queues.clone());
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            registry,
            queues,
            ledger,
            dispatcher,
            tracker,
            shutdown,
        }
    }

    /// Create an orchestrator with the store selected by the configuration:
    /// sqlite at `store_path`, or the explicit in-memory fallback.
    pub fn with_default_store(
        config: OrchConfig,
        registry: ProviderRegistry,
        publisher: Arc<dyn EventPublisher>,
    ) -> OrchResult<Self> {
        let store: Arc<dyn JobStore> = match &config.store_path {
            Some(path) => Arc::new(SqliteStore::new(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(config, registry, store, publisher))
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchConfig {
        &self.config
    }

    /// Whether job state survives a process restart.
    pub fn is_durable(&self) -> bool {
        self.ledger.store().is_durable()
    }

    /// Rebuild in-memory indices from the store and spawn the background
    /// loops. Returns the loop handles.
    pub async fn start(self: Arc<Self>) -> OrchResult<Vec<JoinHandle<()>>> {
        self.recover().await?;

        let monitor = {
            let this = self.clone();
            let mut rx = self.shutdown.subscribe();
            tokio::spawn(async move {
                let mut ticker = interval(this.config.batch_tick);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = this.run_batch_tick().await {
                                error!("batch monitor tick failed: {e}");
                            }
                        }
                        _ = rx.changed() => {
                            if *rx.borrow() {
                                debug!("batch monitor shutting down");
                                break;
                            }
                        }
                    }
                }
            })
        };

        let scheduler = {
            let this = self.clone();
            let mut rx = self.shutdown.subscribe();
            tokio::spawn(async move {
                let mut ticker = interval(this.config.sched_tick);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = this.run_sched_tick().await {
                                error!("time scheduler tick failed: {e}");
                            }
                        }
                        _ = rx.changed() => {
                            if *rx.borrow() {
                                debug!("time scheduler shutting down");
                                break;
                            }
                        }
                    }
                }
            })
        };

        Ok(vec![monitor, scheduler])
    }

    /// Signal the background loops to exit after their current tick.
    /// In-flight provider submissions are not flushed.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Reload persisted jobs and re-queue the ones that were waiting.
    async fn recover(&self) -> OrchResult<()> {
        let jobs = self.ledger.store().load_all().await?;
        let mut requeued = 0usize;
        let mut scheduled = 0usize;

        for sub in &jobs {
            match sub.status {
                JobStatus::Queued | JobStatus::QueuedUnavailable => {
                    self.queues.push(&sub.batch_key(), sub.id).await;
                    requeued += 1;
                }
                JobStatus::Scheduled => scheduled += 1,
                _ => {}
            }
        }

        if !jobs.is_empty() {
            info!(
                total = jobs.len(),
                requeued, scheduled, "recovered persisted jobs"
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit a job: validate, persist, classify, route.
    ///
    /// Validation failures are synchronous and persist nothing.
    pub async fn submit(
        &self,
        request: JobRequest,
        options: SubmitOptions,
    ) -> OrchResult<JobId> {
        let provider = self
            .registry
            .get(&request.provider)
            .map_err(|_| OrchError::UnknownProvider(request.provider.clone()))?;

        if request.shots == 0 {
            return Err(OrchError::InvalidShots("shots must be at least 1".into()));
        }

        let devices = provider.list_devices().await?;
        let device = devices
            .iter()
            .find(|d| d.name == request.device)
            .ok_or_else(|| OrchError::UnknownDevice {
                provider: request.provider.clone(),
                device: request.device.clone(),
            })?;
        if request.shots > device.max_shots {
            return Err(OrchError::InvalidShots(format!(
                "shots {} exceed the device limit of {}",
                request.shots, device.max_shots
            )));
        }

        if request.task.is_source_code() && !provider.supports_code_execution() {
            return Err(OrchError::CodeExecutionUnsupported(request.provider.clone()));
        }

        let key = request.batch_key();
        if request.priority == JobPriority::Standard
            && self.queues.len(&key).await >= self.config.backpressure_high_water
        {
            return Err(OrchError::Backpressure {
                provider: key.provider,
                device: key.device,
            });
        }

        // Persist PENDING before any further action.
        let sub = JobSubmission::new(request, &options);
        let job_id = sub.id;
        self.ledger.admit(&sub).await?;

        // 1. Future-scheduled jobs go to the time index.
        if let Some(fire_at) = options.scheduled_time {
            if fire_at > Utc::now() {
                self.ledger.store().add_scheduled(&job_id, fire_at).await?;
                self.ledger
                    .apply(
                        &job_id,
                        Transition::to(JobStatus::Scheduled)
                            .with_reason(format!("scheduled for {}", fire_at.to_rfc3339())),
                    )
                    .await?;
                info!(job_id = %job_id, fire_at = %fire_at, "job scheduled");
                return Ok(job_id);
            }
        }

        // 2. Optionally park when the device is unavailable.
        if sub.queue_if_unavailable {
            if let Some(reason) = self.unavailable_reason(&sub).await {
                self.ledger
                    .apply(
                        &job_id,
                        Transition::to(JobStatus::QueuedUnavailable).with_reason(reason),
                    )
                    .await?;
                self.queues.push(&sub.batch_key(), job_id).await;
                info!(job_id = %job_id, device = %sub.request.device, "job parked; device unavailable");
                return Ok(job_id);
            }
        }

        // 3./4. Queue; HIGH priority bypasses batching.
        let queued = self
            .ledger
            .apply(&job_id, Transition::to(JobStatus::Queued))
            .await?;
        if queued.request.priority == JobPriority::High {
            self.dispatcher.dispatch(vec![queued]).await;
        } else {
            self.queues.push(&sub.batch_key(), job_id).await;
        }

        Ok(job_id)
    }

    /// Admit a source-code job.
    ///
    /// Source jobs run at HIGH priority and are never batched.
    pub async fn submit_code(
        &self,
        source: impl Into<String>,
        provider: impl Into<String>,
        device: impl Into<String>,
        shots: u32,
        options: SubmitOptions,
    ) -> OrchResult<JobId> {
        let request = JobRequest::new(Task::SourceCode(source.into()), provider, device)
            .with_shots(shots)
            .with_priority(JobPriority::High);
        self.submit(request, options).await
    }

    /// Availability gate: the provider's own verdict, tightened by the
    /// configured `device_queue_threshold`.
    fn gated_available(&self, avail: &nexar_hal::DeviceAvailability) -> bool {
        avail.is_available() && avail.pending_jobs < self.config.device_queue_threshold
    }

    /// The reason the submission's device is unavailable, or `None` when it
    /// is available. An availability check failure parks the job rather
    /// than failing it; the monitor re-checks on every tick.
    async fn unavailable_reason(&self, sub: &JobSubmission) -> Option<String> {
        let provider = self.registry.get(&sub.request.provider).ok()?;
        match provider.check_availability(&sub.request.device).await {
            Ok(avail) if self.gated_available(&avail) => None,
            Ok(avail) => Some(format!(
                "device has {} pending jobs (threshold: {}, operational: {})",
                avail.pending_jobs,
                avail.queue_threshold.min(self.config.device_queue_threshold),
                avail.is_operational
            )),
            Err(e) => Some(format!("availability check failed: {e}")),
        }
    }

    // ------------------------------------------------------------------
    // Status surface
    // ------------------------------------------------------------------

    /// Current status of a job. See [`StatusTracker::get_status`].
    pub async fn status(
        &self,
        job_id: &JobId,
        deadline: Option<Duration>,
    ) -> OrchResult<JobStatus> {
        self.tracker.get_status(job_id, deadline).await
    }

    /// Result of a job, `None` while not yet submitted.
    pub async fn result(
        &self,
        job_id: &JobId,
        deadline: Option<Duration>,
    ) -> OrchResult<Option<JobResult>> {
        self.tracker.get_result(job_id, deadline).await
    }

    /// Cancel a job. See [`StatusTracker::cancel`].
    pub async fn cancel(&self, job_id: &JobId) -> OrchResult<bool> {
        self.tracker.cancel(job_id).await
    }

    /// All jobs currently waiting for their scheduled fire time.
    pub async fn list_scheduled(&self) -> OrchResult<Vec<ScheduledJobInfo>> {
        let jobs = self.ledger.store().list_scheduled().await?;
        Ok(jobs.iter().map(ScheduledJobInfo::from).collect())
    }

    /// Names of all registered providers.
    pub fn providers(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Device descriptors of one provider.
    pub async fn devices(&self, provider: &str) -> OrchResult<Vec<DeviceDescriptor>> {
        let provider = self
            .registry
            .get(provider)
            .map_err(|_| OrchError::UnknownProvider(provider.to_string()))?;
        Ok(provider.list_devices().await?)
    }

    // ------------------------------------------------------------------
    // Scheduler loops
    // ------------------------------------------------------------------

    /// One pass of the time scheduler: fire due SCHEDULED jobs and route
    /// them as admission would.
    pub async fn run_sched_tick(&self) -> OrchResult<()> {
        let due = self.ledger.store().scheduled_due(Utc::now()).await?;

        for sub in due {
            self.ledger.store().remove_scheduled(&sub.id).await?;

            let queued = match self
                .ledger
                .apply(
                    &sub.id,
                    Transition::to(JobStatus::Queued).with_reason("scheduled time reached"),
                )
                .await
            {
                Ok(queued) => queued,
                Err(OrchError::IllegalTransition { .. }) => {
                    // Cancelled (or otherwise moved on) while due; skip.
                    debug!(job_id = %sub.id, "due job no longer schedulable");
                    continue;
                }
                Err(e) => return Err(e),
            };

            info!(job_id = %queued.id, "scheduled job fired");
            self.route_queued(queued).await;
        }

        Ok(())
    }

    /// Route a freshly-QUEUED job exactly as admission routes a
    /// non-scheduled job, honouring the flags captured at admission.
    async fn route_queued(&self, sub: JobSubmission) {
        if sub.queue_if_unavailable {
            if let Some(reason) = self.unavailable_reason(&sub).await {
                match self
                    .ledger
                    .apply(
                        &sub.id,
                        Transition::to(JobStatus::QueuedUnavailable).with_reason(reason),
                    )
                    .await
                {
                    Ok(_) => {
                        self.queues.push(&sub.batch_key(), sub.id).await;
                        return;
                    }
                    Err(e) => {
                        debug!(job_id = %sub.id, "could not park fired job: {e}");
                        return;
                    }
                }
            }
        }

        if sub.request.priority == JobPriority::High {
            self.dispatcher.dispatch(vec![sub]).await;
        } else {
            self.queues.push(&sub.batch_key(), sub.id).await;
        }
    }

    /// One pass of the batch monitor over every pending queue.
    pub async fn run_batch_tick(&self) -> OrchResult<()> {
        for key in self.queues.keys().await {
            if let Err(e) = self.drain_key(&key).await {
                warn!(key = %key, "batch pass failed: {e}");
            }
        }
        Ok(())
    }

    async fn drain_key(&self, key: &BatchKey) -> OrchResult<()> {
        let entries = self.queues.snapshot(key).await;
        if entries.is_empty() {
            return Ok(());
        }

        // Resolve queue members against the authoritative store.
        let mut members: Vec<(PendingJob, JobSubmission)> = Vec::with_capacity(entries.len());
        let mut stale: Vec<JobId> = Vec::new();
        for entry in entries {
            match self.ledger.store().get(&entry.job_id).await? {
                Some(sub) if !sub.status.is_terminal() => members.push((entry, sub)),
                _ => stale.push(entry.job_id),
            }
        }
        if !stale.is_empty() {
            self.queues.remove_ids(key, &stale).await;
        }

        // Revive parked members once the device reports available.
        let parked: Vec<JobId> = members
            .iter()
            .filter(|(_, sub)| sub.status == JobStatus::QueuedUnavailable)
            .map(|(_, sub)| sub.id)
            .collect();
        if !parked.is_empty() && self.device_available(key).await {
            for (_, sub) in members
                .iter_mut()
                .filter(|(_, sub)| sub.status == JobStatus::QueuedUnavailable)
            {
                match self
                    .ledger
                    .apply(
                        &sub.id,
                        Transition::to(JobStatus::Queued).with_reason("device now available"),
                    )
                    .await
                {
                    Ok(updated) => *sub = updated,
                    Err(e) => debug!(job_id = %sub.id, "could not revive parked job: {e}"),
                }
            }
        }

        let queued: Vec<&(PendingJob, JobSubmission)> = members
            .iter()
            .filter(|(_, sub)| sub.status == JobStatus::Queued)
            .collect();
        let Some((oldest_entry, oldest_sub)) = queued.first() else {
            return Ok(());
        };

        // Strategy-derived wait cap, taken from the oldest member.
        let wait = self.config.wait_for(oldest_sub.request.strategy);
        let ready =
            queued.len() >= self.config.max_batch_size || oldest_entry.enqueued.elapsed() >= wait;
        if !ready {
            return Ok(());
        }

        let batch: Vec<JobSubmission> = queued
            .iter()
            .take(self.config.max_batch_size)
            .map(|(_, sub)| sub.clone())
            .collect();
        let ids: Vec<JobId> = batch.iter().map(|sub| sub.id).collect();
        self.queues.remove_ids(key, &ids).await;

        // Different shot counts force separate provider calls; grouping
        // preserves queue order within each group.
        for group in group_by_shots(batch) {
            self.dispatcher.dispatch(group).await;
        }

        Ok(())
    }

    async fn device_available(&self, key: &BatchKey) -> bool {
        let Ok(provider) = self.registry.get(&key.provider) else {
            return false;
        };
        match provider.check_availability(&key.device).await {
            Ok(avail) => self.gated_available(&avail),
            Err(e) => {
                debug!(key = %key, "availability check failed: {e}");
                false
            }
        }
    }
}

/// Partition a batch into runs of equal shot counts, preserving order of
/// first appearance.
fn group_by_shots(batch: Vec<JobSubmission>) -> Vec<Vec<JobSubmission>> {
    let mut groups: Vec<(u32, Vec<JobSubmission>)> = Vec::new();
    for sub in batch {
        let shots = sub.request.shots;
        match groups.iter_mut().find(|(s, _)| *s == shots) {
            Some((_, group)) => group.push(sub),
            None => groups.push((shots, vec![sub])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}
