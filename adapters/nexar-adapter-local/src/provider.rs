//! Local provider implementation.

use std::sync::Mutex;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::debug;
use uuid::Uuid;

use nexar_hal::{
    DeviceAvailability, DeviceDescriptor, HalResult, JobResult, Provider, ProviderConfig,
    ProviderError, ProviderJobId, ProviderJobStatus, ProviderKind, Task,
};
use nexar_script::ScriptCircuit;

/// Name of the always-available simulator device.
pub const SIM_DEVICE: &str = "local_sim";

/// Name of the emulated hardware device (availability is adjustable).
pub const QPU_DEVICE: &str = "local_qpu";

struct LocalJob {
    status: ProviderJobStatus,
    result: Option<JobResult>,
}

struct State {
    jobs: FxHashMap<String, LocalJob>,
    operational: FxHashMap<String, bool>,
    pending_jobs: FxHashMap<String, u32>,
    fail_next_batch: bool,
    hold_jobs: bool,
    batch_calls: usize,
}

/// In-process reference provider.
///
/// Circuits "execute" immediately with a deterministic all-zeros counts
/// map, enough to exercise orchestration semantics end to end without a
/// numerical simulator. Source-code tasks run through the sandboxed
/// [`nexar_script`] frontend.
///
/// Batch submissions return composite ids of the form `base:i`.
pub struct LocalProvider {
    name: String,
    queue_threshold: u32,
    state: Mutex<State>,
}

impl LocalProvider {
    /// Create a provider named `local` with default devices.
    pub fn new() -> Self {
        Self::with_name("local")
    }

    /// Create a provider from configuration.
    ///
    /// Honours the registry name and `queue_threshold`; endpoint and token
    /// are meaningless for an in-process backend and are ignored.
    pub fn from_config(config: ProviderConfig) -> Self {
        let mut provider = Self::with_name(config.name);
        if let Some(threshold) = config.queue_threshold {
            provider.queue_threshold = threshold;
        }
        provider
    }

    /// Create a provider with a custom registry name.
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut operational = FxHashMap::default();
        operational.insert(SIM_DEVICE.to_string(), true);
        operational.insert(QPU_DEVICE.to_string(), true);
        let mut pending_jobs = FxHashMap::default();
        pending_jobs.insert(SIM_DEVICE.to_string(), 0);
        pending_jobs.insert(QPU_DEVICE.to_string(), 0);

        Self {
            name: name.into(),
            queue_threshold: 50,
            state: Mutex::new(State {
                jobs: FxHashMap::default(),
                operational,
                pending_jobs,
                fail_next_batch: false,
                hold_jobs: false,
                batch_calls: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Mark a device operational or not (test knob).
    pub fn set_operational(&self, device: &str, operational: bool) {
        self.lock()
            .operational
            .insert(device.to_string(), operational);
    }

    /// Set a device's pending-jobs count (test knob).
    pub fn set_pending_jobs(&self, device: &str, pending: u32) {
        self.lock()
            .pending_jobs
            .insert(device.to_string(), pending);
    }

    /// Fail the next `execute_batch` call with a transient error (test knob).
    pub fn fail_next_batch(&self) {
        self.lock().fail_next_batch = true;
    }

    /// When set, submitted jobs stay QUEUED until completed explicitly
    /// (test knob for status reconciliation).
    pub fn hold_jobs(&self, hold: bool) {
        self.lock().hold_jobs = hold;
    }

    /// Number of `execute_batch` calls accepted so far.
    pub fn batch_calls(&self) -> usize {
        self.lock().batch_calls
    }

    /// Complete a held job with the default result.
    pub fn complete_job(&self, job_id: &ProviderJobId) {
        let mut state = self.lock();
        if let Some(job) = state.jobs.get_mut(&job_id.0) {
            job.status = ProviderJobStatus::Completed;
            if job.result.is_none() {
                job.result = Some(zero_counts_result(2, 1024));
            }
        }
    }

    /// Fail a held job (test knob).
    pub fn fail_job(&self, job_id: &ProviderJobId) {
        let mut state = self.lock();
        if let Some(job) = state.jobs.get_mut(&job_id.0) {
            job.status = ProviderJobStatus::Failed;
        }
    }

    fn known_device(&self, device: &str) -> HalResult<()> {
        if device == SIM_DEVICE || device == QPU_DEVICE {
            Ok(())
        } else {
            Err(ProviderError::InvalidDevice(format!(
                "unknown device '{device}' on provider '{}'",
                self.name
            )))
        }
    }

    fn insert_job(&self, id: String, width: u32, shots: u32) {
        let mut state = self.lock();
        let (status, result) = if state.hold_jobs {
            (ProviderJobStatus::Queued, None)
        } else {
            (
                ProviderJobStatus::Completed,
                Some(zero_counts_result(width, shots)),
            )
        };
        state.jobs.insert(id, LocalJob { status, result });
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// All-shots-in-the-zero-state counts for a register of `width` bits.
fn zero_counts_result(width: u32, shots: u32) -> JobResult {
    let bitstring = "0".repeat(width.max(1) as usize);
    let mut result = JobResult::from_counts([(bitstring, u64::from(shots))]);
    result.insert("shots", shots);
    result
}

fn circuit_width(task: &Task) -> u32 {
    match task {
        Task::Circuit(value) => value
            .get("num_qubits")
            .and_then(serde_json::Value::as_u64)
            .map_or(2, |n| n as u32),
        Task::SourceCode(_) => 2,
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Quantum
    }

    async fn list_devices(&self) -> HalResult<Vec<DeviceDescriptor>> {
        let state = self.lock();
        let mut sim = DeviceDescriptor::simulator(SIM_DEVICE, 32);
        sim.is_operational = *state.operational.get(SIM_DEVICE).unwrap_or(&true);
        sim.pending_jobs = *state.pending_jobs.get(SIM_DEVICE).unwrap_or(&0);

        let mut qpu = DeviceDescriptor::hardware(QPU_DEVICE, 16);
        qpu.is_operational = *state.operational.get(QPU_DEVICE).unwrap_or(&true);
        qpu.pending_jobs = *state.pending_jobs.get(QPU_DEVICE).unwrap_or(&0);

        Ok(vec![sim, qpu])
    }

    async fn check_availability(&self, device: &str) -> HalResult<DeviceAvailability> {
        self.known_device(device)?;
        let state = self.lock();
        Ok(DeviceAvailability {
            device_name: device.to_string(),
            is_operational: *state.operational.get(device).unwrap_or(&true),
            pending_jobs: *state.pending_jobs.get(device).unwrap_or(&0),
            queue_threshold: self.queue_threshold,
        })
    }

    async fn execute_batch(
        &self,
        tasks: &[Task],
        device: &str,
        shots: u32,
    ) -> HalResult<Vec<ProviderJobId>> {
        self.known_device(device)?;
        if tasks.is_empty() {
            return Err(ProviderError::InvalidTask("empty batch".into()));
        }
        if tasks.iter().any(Task::is_source_code) {
            return Err(ProviderError::InvalidTask(
                "source-code tasks must go through execute_code".into(),
            ));
        }
        {
            let mut state = self.lock();
            if state.fail_next_batch {
                state.fail_next_batch = false;
                return Err(ProviderError::Transient("injected batch failure".into()));
            }
            state.batch_calls += 1;
        }

        let base = Uuid::new_v4().to_string();
        let mut ids = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            let id = ProviderJobId::composite(&base, i);
            self.insert_job(id.0.clone(), circuit_width(task), shots);
            ids.push(id);
        }
        debug!(device, count = tasks.len(), base, "batch accepted");
        Ok(ids)
    }

    fn supports_code_execution(&self) -> bool {
        true
    }

    async fn execute_code(
        &self,
        source: &str,
        device: &str,
        shots: u32,
    ) -> HalResult<ProviderJobId> {
        self.known_device(device)?;

        let circuit: ScriptCircuit = nexar_script::evaluate(source)
            .map_err(|e| ProviderError::InvalidTask(e.to_string()))?
            .circuit;

        let id = ProviderJobId::new(Uuid::new_v4().to_string());
        let width = circuit.num_clbits.max(circuit.num_qubits);
        self.insert_job(id.0.clone(), width, shots);
        debug!(device, %id, ops = circuit.ops.len(), "source job accepted");
        Ok(id)
    }

    async fn get_status(&self, job_id: &ProviderJobId) -> HalResult<ProviderJobStatus> {
        let state = self.lock();
        Ok(state
            .jobs
            .get(&job_id.0)
            .map_or(ProviderJobStatus::Unknown, |job| job.status))
    }

    async fn get_result(&self, job_id: &ProviderJobId) -> HalResult<JobResult> {
        let state = self.lock();
        let job = state
            .jobs
            .get(&job_id.0)
            .ok_or_else(|| ProviderError::InvalidTask(format!("unknown job id '{job_id}'")))?;
        match job.status {
            ProviderJobStatus::Completed => job
                .result
                .clone()
                .ok_or_else(|| ProviderError::Permanent("completed job lost its result".into())),
            ProviderJobStatus::Failed => {
                Err(ProviderError::Permanent("job failed on the provider".into()))
            }
            _ => Err(ProviderError::Transient("result not ready".into())),
        }
    }

    async fn cancel(&self, job_id: &ProviderJobId) -> HalResult<()> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(&job_id.0)
            .ok_or_else(|| ProviderError::InvalidTask(format!("unknown job id '{job_id}'")))?;
        if job.status.is_terminal() {
            return Err(ProviderError::InvalidTask(format!(
                "job '{job_id}' is already {}",
                job.status
            )));
        }
        job.status = ProviderJobStatus::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circuit_task(num_qubits: u32) -> Task {
        Task::Circuit(serde_json::json!({ "num_qubits": num_qubits, "ops": [] }))
    }

    #[tokio::test]
    async fn test_list_devices() {
        let provider = LocalProvider::new();
        let devices = provider.list_devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().any(|d| d.name == SIM_DEVICE && d.is_simulator));
        assert!(devices.iter().any(|d| d.name == QPU_DEVICE && !d.is_simulator));
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = ProviderConfig::new("local-a").with_queue_threshold(5);
        let provider = LocalProvider::from_config(config);
        assert_eq!(provider.name(), "local-a");

        provider.set_pending_jobs(SIM_DEVICE, 5);
        let avail = provider.check_availability(SIM_DEVICE).await.unwrap();
        assert_eq!(avail.queue_threshold, 5);
        assert!(!avail.is_available());

        provider.set_pending_jobs(SIM_DEVICE, 4);
        let avail = provider.check_availability(SIM_DEVICE).await.unwrap();
        assert!(avail.is_available());
    }

    #[tokio::test]
    async fn test_availability_gating() {
        let provider = LocalProvider::new();

        let avail = provider.check_availability(QPU_DEVICE).await.unwrap();
        assert!(avail.is_available());

        provider.set_pending_jobs(QPU_DEVICE, 100);
        let avail = provider.check_availability(QPU_DEVICE).await.unwrap();
        assert!(!avail.is_available());

        provider.set_pending_jobs(QPU_DEVICE, 0);
        provider.set_operational(QPU_DEVICE, false);
        let avail = provider.check_availability(QPU_DEVICE).await.unwrap();
        assert!(!avail.is_available());

        assert!(provider.check_availability("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_batch_composite_ids() {
        let provider = LocalProvider::new();
        let tasks = vec![circuit_task(2), circuit_task(3), circuit_task(4)];

        let ids = provider
            .execute_batch(&tasks, SIM_DEVICE, 100)
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(id.index(), Some(i));
            assert_eq!(
                provider.get_status(id).await.unwrap(),
                ProviderJobStatus::Completed
            );
        }

        // Each slot carries its own circuit's width.
        let result = provider.get_result(&ids[2]).await.unwrap();
        assert_eq!(result.get("0000"), Some(&serde_json::Value::from(100u64)));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let provider = LocalProvider::new();
        let err = provider
            .execute_batch(&[], SIM_DEVICE, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidTask(_)));
    }

    #[tokio::test]
    async fn test_execute_code_builds_circuit() {
        let provider = LocalProvider::new();
        let source = "\
circuit = QuantumCircuit(2, 2)
circuit.h(0)
circuit.cx(0, 1)
circuit.measure_all()
";
        let id = provider
            .execute_code(source, SIM_DEVICE, 512)
            .await
            .unwrap();
        assert_eq!(id.index(), None);

        let result = provider.get_result(&id).await.unwrap();
        assert_eq!(result.get("00"), Some(&serde_json::Value::from(512u64)));
    }

    #[tokio::test]
    async fn test_execute_code_sandbox_rejection() {
        let provider = LocalProvider::new();
        let err = provider
            .execute_code("circuit = open(\"/etc/passwd\")", SIM_DEVICE, 100)
            .await
            .unwrap_err();
        let ProviderError::InvalidTask(message) = err else {
            panic!("expected InvalidTask");
        };
        assert!(message.contains("open"));
    }

    #[tokio::test]
    async fn test_hold_and_complete() {
        let provider = LocalProvider::new();
        provider.hold_jobs(true);

        let ids = provider
            .execute_batch(&[circuit_task(2)], SIM_DEVICE, 100)
            .await
            .unwrap();
        assert_eq!(
            provider.get_status(&ids[0]).await.unwrap(),
            ProviderJobStatus::Queued
        );
        assert!(matches!(
            provider.get_result(&ids[0]).await.unwrap_err(),
            ProviderError::Transient(_)
        ));

        provider.complete_job(&ids[0]);
        assert_eq!(
            provider.get_status(&ids[0]).await.unwrap(),
            ProviderJobStatus::Completed
        );
        assert!(provider.get_result(&ids[0]).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_id_status() {
        let provider = LocalProvider::new();
        let status = provider
            .get_status(&ProviderJobId::new("missing"))
            .await
            .unwrap();
        assert_eq!(status, ProviderJobStatus::Unknown);
    }

    #[tokio::test]
    async fn test_cancel_held_job() {
        let provider = LocalProvider::new();
        provider.hold_jobs(true);
        let ids = provider
            .execute_batch(&[circuit_task(2)], SIM_DEVICE, 100)
            .await
            .unwrap();

        provider.cancel(&ids[0]).await.unwrap();
        assert_eq!(
            provider.get_status(&ids[0]).await.unwrap(),
            ProviderJobStatus::Cancelled
        );
        assert!(provider.cancel(&ids[0]).await.is_err());
    }
}
