//! End-to-end orchestrator flows against the local reference provider.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nexar_adapter_local::{LocalProvider, QPU_DEVICE, SIM_DEVICE};
use nexar_hal::{ProviderJobId, ProviderRegistry, Task};
use nexar_orch::{
    ErrorCode, InMemoryBus, JobId, JobPriority, JobRequest, JobStatus, JobStore, LifecycleEvent,
    MemoryStore, OptimizationStrategy, OrchConfig, OrchError, Orchestrator, SqliteStore,
    SubmitOptions,
};
use tokio::sync::broadcast;

struct Harness {
    orch: Orchestrator,
    provider: Arc<LocalProvider>,
    store: Arc<dyn JobStore>,
    events: broadcast::Receiver<(String, LifecycleEvent)>,
}

fn test_config() -> OrchConfig {
    OrchConfig {
        store_path: None,
        ..OrchConfig::default()
    }
}

fn harness(config: OrchConfig) -> Harness {
    let provider = Arc::new(LocalProvider::new());
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone());

    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let bus = Arc::new(InMemoryBus::default());
    let events = bus.subscribe();

    Harness {
        orch: Orchestrator::new(config, registry, store.clone(), bus),
        provider,
        store,
        events,
    }
}

fn circuit_task(num_qubits: u32) -> Task {
    Task::Circuit(serde_json::json!({ "num_qubits": num_qubits, "ops": [] }))
}

fn standard_request(task: Task, device: &str, strategy: OptimizationStrategy) -> JobRequest {
    JobRequest::new(task, "local", device)
        .with_priority(JobPriority::Standard)
        .with_strategy(strategy)
}

fn drain_events(rx: &mut broadcast::Receiver<(String, LifecycleEvent)>) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    while let Ok((_, event)) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn stored_status(store: &Arc<dyn JobStore>, job_id: &JobId) -> JobStatus {
    store.get(job_id).await.unwrap().unwrap().status
}

async fn provider_id(store: &Arc<dyn JobStore>, job_id: &JobId) -> Option<ProviderJobId> {
    store.get(job_id).await.unwrap().unwrap().provider_job_id
}

// S1: HIGH priority bypasses batching inside one admission call.
#[tokio::test]
async fn high_priority_bypasses_batching() {
    let mut h = harness(test_config());

    let request = JobRequest::new(circuit_task(2), "local", SIM_DEVICE).with_shots(1024);
    let job_id = h.orch.submit(request, SubmitOptions::default()).await.unwrap();

    // Submitted without any monitor tick.
    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Submitted);
    assert!(provider_id(&h.store, &job_id).await.is_some());

    let statuses: Vec<JobStatus> = drain_events(&mut h.events)
        .iter()
        .map(|e| e.status)
        .collect();
    assert_eq!(statuses, vec![JobStatus::Queued, JobStatus::Submitted]);

    // get_status reconciles against the provider.
    let status = h.orch.status(&job_id, None).await.unwrap();
    assert_eq!(status, JobStatus::Completed);

    let result = h.orch.result(&job_id, None).await.unwrap().unwrap();
    assert_eq!(result.get("00"), Some(&serde_json::Value::from(1024u64)));
}

// S2: COST batching fills up to MAX_BATCH_SIZE and dispatches in one call.
#[tokio::test(start_paused = true)]
async fn cost_batching_dispatches_full_batch_in_order() {
    let mut h = harness(test_config());

    let mut job_ids = Vec::new();
    for i in 0..10 {
        let request = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Cost)
            .with_shots(1024);
        let job_id = h.orch.submit(request, SubmitOptions::default()).await.unwrap();
        job_ids.push((i, job_id));
    }
    assert_eq!(h.provider.batch_calls(), 0);

    h.orch.run_batch_tick().await.unwrap();

    assert_eq!(h.provider.batch_calls(), 1);
    let mut base = None;
    for (i, job_id) in &job_ids {
        assert_eq!(stored_status(&h.store, job_id).await, JobStatus::Submitted);
        let pid = provider_id(&h.store, job_id).await.unwrap();
        assert_eq!(pid.index(), Some(*i));
        match &base {
            None => base = Some(pid.base().to_string()),
            Some(base) => assert_eq!(pid.base(), base),
        }
    }

    let submitted = drain_events(&mut h.events)
        .iter()
        .filter(|e| e.status == JobStatus::Submitted)
        .count();
    assert_eq!(submitted, 10);
}

// S3: TIME strategy dispatches a partial batch once the wait cap elapses.
#[tokio::test(start_paused = true)]
async fn time_strategy_dispatches_on_age() {
    let h = harness(test_config());

    let mut job_ids = Vec::new();
    for _ in 0..3 {
        let request = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Time);
        job_ids.push(h.orch.submit(request, SubmitOptions::default()).await.unwrap());
    }

    // Young batch: not ready yet.
    h.orch.run_batch_tick().await.unwrap();
    assert_eq!(h.provider.batch_calls(), 0);

    tokio::time::advance(Duration::from_millis(1100)).await;
    h.orch.run_batch_tick().await.unwrap();

    assert_eq!(h.provider.batch_calls(), 1);
    for job_id in &job_ids {
        assert_eq!(stored_status(&h.store, job_id).await, JobStatus::Submitted);
    }
}

// Round-trip law: N standard jobs within the COST window yield ceil(N/max)
// provider calls.
#[tokio::test(start_paused = true)]
async fn batching_respects_max_batch_size() {
    let h = harness(test_config());

    for _ in 0..25 {
        let request = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Cost);
        h.orch.submit(request, SubmitOptions::default()).await.unwrap();
    }

    // Two full batches are size-ready immediately.
    h.orch.run_batch_tick().await.unwrap();
    h.orch.run_batch_tick().await.unwrap();
    assert_eq!(h.provider.batch_calls(), 2);

    // The remainder waits for the COST cap.
    h.orch.run_batch_tick().await.unwrap();
    assert_eq!(h.provider.batch_calls(), 2);

    tokio::time::advance(Duration::from_secs(11)).await;
    h.orch.run_batch_tick().await.unwrap();
    assert_eq!(h.provider.batch_calls(), 3);
}

// Mixed shot counts in one queue force separate provider calls.
#[tokio::test(start_paused = true)]
async fn mixed_shots_split_the_batch() {
    let h = harness(test_config());

    for shots in [100, 200, 100] {
        let request = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Time)
            .with_shots(shots);
        h.orch.submit(request, SubmitOptions::default()).await.unwrap();
    }

    tokio::time::advance(Duration::from_millis(1100)).await;
    h.orch.run_batch_tick().await.unwrap();

    assert_eq!(h.provider.batch_calls(), 2);
}

// S4: a scheduled job stays SCHEDULED until its fire time, then follows the
// normal route.
#[tokio::test]
async fn scheduled_job_fires_after_its_time() {
    let mut h = harness(test_config());

    let request = JobRequest::new(circuit_task(2), "local", SIM_DEVICE);
    let fire_at = Utc::now() + chrono::Duration::milliseconds(200);
    let job_id = h.orch.submit(request, SubmitOptions::at(fire_at)).await.unwrap();

    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Scheduled);
    let listed = h.orch.list_scheduled().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].job_id, job_id);

    // Not due yet.
    h.orch.run_sched_tick().await.unwrap();
    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Scheduled);

    tokio::time::sleep(Duration::from_millis(250)).await;
    h.orch.run_sched_tick().await.unwrap();

    // HIGH priority: dispatched on fire.
    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Submitted);
    assert!(h.orch.list_scheduled().await.unwrap().is_empty());

    let events = drain_events(&mut h.events);
    let fired = events
        .iter()
        .find(|e| e.status == JobStatus::Queued)
        .unwrap();
    assert_eq!(fired.reason.as_deref(), Some("scheduled time reached"));
}

// S5: queue_if_unavailable parks the job, and the monitor revives it when
// the device recovers.
#[tokio::test(start_paused = true)]
async fn unavailable_device_parks_then_revives() {
    let mut h = harness(test_config());
    h.provider.set_pending_jobs(QPU_DEVICE, 100);

    let request = standard_request(circuit_task(2), QPU_DEVICE, OptimizationStrategy::Time);
    let job_id = h
        .orch
        .submit(request, SubmitOptions::default().queue_if_unavailable())
        .await
        .unwrap();

    assert_eq!(
        stored_status(&h.store, &job_id).await,
        JobStatus::QueuedUnavailable
    );
    let parked = drain_events(&mut h.events);
    assert_eq!(parked.last().unwrap().status, JobStatus::QueuedUnavailable);
    assert!(parked.last().unwrap().reason.as_deref().unwrap().contains("pending"));

    // Still unavailable: the monitor leaves it parked.
    h.orch.run_batch_tick().await.unwrap();
    assert_eq!(
        stored_status(&h.store, &job_id).await,
        JobStatus::QueuedUnavailable
    );

    // Device recovers; the job is revived and (aged past the cap) dispatched.
    h.provider.set_pending_jobs(QPU_DEVICE, 0);
    tokio::time::advance(Duration::from_millis(1100)).await;
    h.orch.run_batch_tick().await.unwrap();

    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Submitted);
    let events = drain_events(&mut h.events);
    let revived = events
        .iter()
        .find(|e| e.status == JobStatus::Queued)
        .unwrap();
    assert_eq!(revived.reason.as_deref(), Some("device now available"));
}

// S6: sandbox rejection fails the submission without a provider-side job.
#[tokio::test]
async fn sandbox_rejection_fails_the_job() {
    let mut h = harness(test_config());

    let job_id = h
        .orch
        .submit_code(
            "circuit = open(\"/etc/passwd\")",
            "local",
            SIM_DEVICE,
            1024,
            SubmitOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Failed);
    assert!(provider_id(&h.store, &job_id).await.is_none());

    let events = drain_events(&mut h.events);
    let failed = events.iter().find(|e| e.status == JobStatus::Failed).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("open"));

    let err = h.orch.result(&job_id, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

// Valid source code executes through the sandbox.
#[tokio::test]
async fn source_code_job_completes() {
    let h = harness(test_config());

    let source = "\
circuit = QuantumCircuit(2, 2)
circuit.h(0)
circuit.cx(0, 1)
circuit.measure_all()
";
    let job_id = h
        .orch
        .submit_code(source, "local", SIM_DEVICE, 512, SubmitOptions::default())
        .await
        .unwrap();

    let status = h.orch.status(&job_id, None).await.unwrap();
    assert_eq!(status, JobStatus::Completed);

    let result = h.orch.result(&job_id, None).await.unwrap().unwrap();
    assert_eq!(result.get("00"), Some(&serde_json::Value::from(512u64)));
}

#[tokio::test]
async fn validation_failures_persist_nothing() {
    let h = harness(test_config());

    let unknown_provider = JobRequest::new(circuit_task(2), "nope", SIM_DEVICE);
    let err = h
        .orch
        .submit(unknown_provider, SubmitOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);

    let unknown_device = JobRequest::new(circuit_task(2), "local", "nope");
    let err = h
        .orch
        .submit(unknown_device, SubmitOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);

    let zero_shots = JobRequest::new(circuit_task(2), "local", SIM_DEVICE).with_shots(0);
    let err = h.orch.submit(zero_shots, SubmitOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);

    let too_many_shots =
        JobRequest::new(circuit_task(2), "local", SIM_DEVICE).with_shots(10_000_000);
    let err = h
        .orch
        .submit(too_many_shots, SubmitOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);

    // Nothing was admitted.
    assert!(h.store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn backpressure_rejects_standard_but_not_high() {
    let config = OrchConfig {
        backpressure_high_water: 2,
        ..test_config()
    };
    let h = harness(config);

    for _ in 0..2 {
        let request = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Cost);
        h.orch.submit(request, SubmitOptions::default()).await.unwrap();
    }

    let rejected = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Cost);
    let err = h.orch.submit(rejected, SubmitOptions::default()).await.unwrap_err();
    assert!(matches!(err, OrchError::Backpressure { .. }));
    assert_eq!(err.code(), ErrorCode::Unavailable);

    // HIGH priority is never rejected by backpressure.
    let high = JobRequest::new(circuit_task(2), "local", SIM_DEVICE);
    assert!(h.orch.submit(high, SubmitOptions::default()).await.is_ok());
}

#[tokio::test]
async fn cancel_scheduled_removes_all_indices() {
    let h = harness(test_config());

    let request = JobRequest::new(circuit_task(2), "local", SIM_DEVICE);
    let fire_at = Utc::now() + chrono::Duration::hours(1);
    let job_id = h.orch.submit(request, SubmitOptions::at(fire_at)).await.unwrap();

    assert!(h.orch.cancel(&job_id).await.unwrap());
    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Cancelled);
    assert!(h.orch.list_scheduled().await.unwrap().is_empty());

    // Firing the scheduler later must not resurrect the job.
    h.orch.run_sched_tick().await.unwrap();
    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancel_queued_prevents_dispatch() {
    let h = harness(test_config());

    let request = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Time);
    let job_id = h.orch.submit(request, SubmitOptions::default()).await.unwrap();

    assert!(h.orch.cancel(&job_id).await.unwrap());

    tokio::time::advance(Duration::from_secs(2)).await;
    h.orch.run_batch_tick().await.unwrap();

    assert_eq!(h.provider.batch_calls(), 0);
    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_terminal_job_is_a_conflict() {
    let h = harness(test_config());

    let request = JobRequest::new(circuit_task(2), "local", SIM_DEVICE);
    let job_id = h.orch.submit(request, SubmitOptions::default()).await.unwrap();
    // Reconcile to COMPLETED.
    h.orch.status(&job_id, None).await.unwrap();

    let err = h.orch.cancel(&job_id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[tokio::test]
async fn unknown_job_id_is_unknown() {
    let h = harness(test_config());
    let status = h.orch.status(&JobId::new(), None).await.unwrap();
    assert_eq!(status, JobStatus::Unknown);

    let err = h.orch.result(&JobId::new(), None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn terminal_status_is_served_locally() {
    let h = harness(test_config());

    let request = JobRequest::new(circuit_task(2), "local", SIM_DEVICE);
    let job_id = h.orch.submit(request, SubmitOptions::default()).await.unwrap();

    assert_eq!(h.orch.status(&job_id, None).await.unwrap(), JobStatus::Completed);
    // Idempotent once terminal.
    assert_eq!(h.orch.status(&job_id, None).await.unwrap(), JobStatus::Completed);
}

#[tokio::test]
async fn held_jobs_reconcile_on_pull() {
    let h = harness(test_config());
    h.provider.hold_jobs(true);

    let request = JobRequest::new(circuit_task(2), "local", SIM_DEVICE);
    let job_id = h.orch.submit(request, SubmitOptions::default()).await.unwrap();

    // Provider still holds the job: local state is authoritative.
    assert_eq!(h.orch.status(&job_id, None).await.unwrap(), JobStatus::Submitted);

    // Result is not ready: transient error, no state change.
    let err = h.orch.result(&job_id, None).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Submitted);

    let pid = provider_id(&h.store, &job_id).await.unwrap();
    h.provider.complete_job(&pid);

    assert_eq!(h.orch.status(&job_id, None).await.unwrap(), JobStatus::Completed);
    assert!(h.orch.result(&job_id, None).await.unwrap().is_some());
}

#[tokio::test]
async fn transient_batch_failure_fails_members() {
    let mut h = harness(test_config());
    h.provider.fail_next_batch();

    let request = JobRequest::new(circuit_task(2), "local", SIM_DEVICE);
    let job_id = h.orch.submit(request, SubmitOptions::default()).await.unwrap();

    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Failed);
    let events = drain_events(&mut h.events);
    let failed = events.iter().find(|e| e.status == JobStatus::Failed).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("injected"));
}

#[tokio::test]
async fn surface_lists_providers_and_devices() {
    let h = harness(test_config());

    assert_eq!(h.orch.providers(), vec!["local"]);

    let devices = h.orch.devices("local").await.unwrap();
    assert_eq!(devices.len(), 2);
    assert!(devices.iter().any(|d| d.name == SIM_DEVICE));

    let err = h.orch.devices("nope").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

// Invariant 3: restart with a durable store restores non-terminal jobs.
#[tokio::test(start_paused = true)]
async fn restart_recovers_scheduled_and_queued_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");

    let provider = Arc::new(LocalProvider::new());
    let fire_at = Utc::now() + chrono::Duration::hours(1);

    let (scheduled_id, queued_id) = {
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        let store: Arc<dyn JobStore> = Arc::new(SqliteStore::new(&path).unwrap());
        let orch = Orchestrator::new(
            test_config(),
            registry,
            store,
            Arc::new(InMemoryBus::default()),
        );

        let scheduled = JobRequest::new(circuit_task(2), "local", SIM_DEVICE);
        let scheduled_id = orch.submit(scheduled, SubmitOptions::at(fire_at)).await.unwrap();

        let queued = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Time);
        let queued_id = orch.submit(queued, SubmitOptions::default()).await.unwrap();

        (scheduled_id, queued_id)
    };

    // New process: same store path, fresh orchestrator.
    let mut registry = ProviderRegistry::new();
    registry.register(provider);
    let store: Arc<dyn JobStore> = Arc::new(SqliteStore::new(&path).unwrap());
    let orch = Arc::new(Orchestrator::new(
        test_config(),
        registry,
        store.clone(),
        Arc::new(InMemoryBus::default()),
    ));
    let handles = orch.clone().start().await.unwrap();
    orch.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(orch.is_durable());
    assert_eq!(
        stored_status(&store, &scheduled_id).await,
        JobStatus::Scheduled
    );
    assert_eq!(stored_status(&store, &queued_id).await, JobStatus::Queued);
    assert_eq!(orch.list_scheduled().await.unwrap().len(), 1);

    // The recovered queued job dispatches once its wait cap elapses.
    tokio::time::advance(Duration::from_millis(1100)).await;
    orch.run_batch_tick().await.unwrap();
    assert_eq!(stored_status(&store, &queued_id).await, JobStatus::Submitted);
    assert!(provider_id(&store, &queued_id).await.is_some());
}

// The background loops run and drain work without manual ticks.
#[tokio::test(start_paused = true)]
async fn background_loops_dispatch_standard_jobs() {
    let h = harness(test_config());
    let orch = Arc::new(h.orch);
    let handles = orch.clone().start().await.unwrap();

    let request = standard_request(circuit_task(2), SIM_DEVICE, OptimizationStrategy::Time);
    let job_id = orch.submit(request, SubmitOptions::default()).await.unwrap();

    // Past the TIME cap plus one batch tick.
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(stored_status(&h.store, &job_id).await, JobStatus::Submitted);

    orch.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }
}
