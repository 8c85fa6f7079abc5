//! Nexar HAL Job Orchestrator
//!
//! Accepts compute tasks, routes them to pluggable providers, and manages
//! their full lifecycle: admission, scheduling, batching, submission,
//! status tracking, durable persistence, and event publication.
//!
//! # Overview
//!
//! - [`Orchestrator`]: the composition root and caller surface.
//! - [`JobStore`]: durable `job_id -> JobSubmission` mapping with a
//!   time-indexed scheduled set ([`SqliteStore`] or the explicitly
//!   non-durable [`MemoryStore`]).
//! - Batch monitor: drains per-`(provider, device)` queues by size or age
//!   under the TIME/COST strategy wait caps.
//! - Time scheduler: fires SCHEDULED jobs when their wall-clock time
//!   arrives and routes them as fresh admissions.
//! - [`BatchDispatcher`]: packs eligible submissions into one provider
//!   call and binds the returned handles back per submission.
//! - [`StatusTracker`]: pull-based reconciliation with providers.
//! - [`EventPublisher`]: at-least-once lifecycle event publication.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nexar_adapter_local::LocalProvider;
//! use nexar_hal::{ProviderRegistry, Task};
//! use nexar_orch::{
//!     InMemoryBus, JobRequest, OrchConfig, Orchestrator, SubmitOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = ProviderRegistry::new();
//!     registry.register(Arc::new(LocalProvider::new()));
//!
//!     let orch = Arc::new(Orchestrator::with_default_store(
//!         OrchConfig::default(),
//!         registry,
//!         Arc::new(InMemoryBus::default()),
//!     )?);
//!     let _handles = orch.clone().start().await?;
//!
//!     let request = JobRequest::new(
//!         Task::Circuit(serde_json::json!({"ops": []})),
//!         "local",
//!         "local_sim",
//!     );
//!     let job_id = orch.submit(request, SubmitOptions::default()).await?;
//!     println!("submitted {job_id}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod ledger;
pub mod orchestrator;
pub mod queues;
pub mod store;
pub mod submission;
pub mod tracker;

pub use config::OrchConfig;
pub use dispatcher::BatchDispatcher;
pub use error::{ErrorCode, OrchError, OrchResult};
pub use events::{EventPublisher, InMemoryBus, LifecycleEvent, LogPublisher};
pub use ledger::{JobLedger, Transition};
pub use orchestrator::Orchestrator;
pub use queues::BatchQueues;
pub use store::{JobStore, MemoryStore, SqliteStore};
pub use submission::{
    BatchKey, JobId, JobPriority, JobRequest, JobStatus, JobSubmission, OptimizationStrategy,
    ScheduledJobInfo, SubmitOptions,
};
pub use tracker::StatusTracker;
