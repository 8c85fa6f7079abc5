//! Orchestrator configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::submission::OptimizationStrategy;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchConfig {
    /// Batch monitor period.
    pub batch_tick: Duration,

    /// Time-scheduler period.
    pub sched_tick: Duration,

    /// Wait cap for the TIME strategy.
    pub time_wait: Duration,

    /// Wait cap for the COST strategy.
    pub cost_wait: Duration,

    /// Maximum submissions per provider batch call.
    pub max_batch_size: usize,

    /// Pending-jobs count above which a device counts as unavailable.
    pub device_queue_threshold: u32,

    /// Per-key queue depth at which STANDARD admissions are rejected.
    pub backpressure_high_water: usize,

    /// Path of the sqlite store. `None` selects the explicit in-memory
    /// store with reduced durability guarantees.
    pub store_path: Option<PathBuf>,

    /// Topic lifecycle events are published to.
    pub event_topic: String,
}

impl Default for OrchConfig {
    fn default() -> Self {
        Self {
            batch_tick: Duration::from_secs(2),
            sched_tick: Duration::from_secs(1),
            time_wait: Duration::from_secs(1),
            cost_wait: Duration::from_secs(10),
            max_batch_size: 10,
            device_queue_threshold: 50,
            backpressure_high_water: 100,
            store_path: std::env::var("NEXAR_STORE_PATH").map(PathBuf::from).ok(),
            event_topic: "hal.jobs".to_string(),
        }
    }
}

impl OrchConfig {
    /// Configuration with every env override applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("NEXAR_BATCH_TICK_MS") {
            if let Ok(ms) = v.parse() {
                config.batch_tick = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("NEXAR_SCHED_TICK_MS") {
            if let Ok(ms) = v.parse() {
                config.sched_tick = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("NEXAR_MAX_BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                config.max_batch_size = n;
            }
        }
        if let Ok(v) = std::env::var("NEXAR_DEVICE_QUEUE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                config.device_queue_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("NEXAR_EVENT_TOPIC") {
            config.event_topic = v;
        }
        config
    }

    /// The wait cap for a batching strategy.
    pub fn wait_for(&self, strategy: OptimizationStrategy) -> Duration {
        match strategy {
            OptimizationStrategy::Time => self.time_wait,
            OptimizationStrategy::Cost => self.cost_wait,
        }
    }
}
