//! Nexar Hardware Abstraction Layer
//!
//! This crate defines the pluggable provider contract that the job
//! orchestrator routes work through. A [`Provider`] abstracts a
//! heterogeneous compute backend (a quantum cloud service, a classical
//! execution service, a local simulator) behind a fixed capability set:
//! device discovery, availability checks, batched submission, status and
//! result retrieval, and optional sandboxed source-code execution.
//!
//! # Example: implementing a provider
//!
//! ```ignore
//! use nexar_hal::{
//!     DeviceAvailability, DeviceDescriptor, HalResult, JobResult, Provider,
//!     ProviderJobId, ProviderJobStatus, ProviderKind, Task,
//! };
//! use async_trait::async_trait;
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl Provider for MyProvider {
//!     fn name(&self) -> &str { "my-provider" }
//!     fn kind(&self) -> ProviderKind { ProviderKind::Quantum }
//!
//!     async fn list_devices(&self) -> HalResult<Vec<DeviceDescriptor>> {
//!         # todo!()
//!     }
//!
//!     async fn check_availability(&self, device: &str) -> HalResult<DeviceAvailability> {
//!         # todo!()
//!     }
//!
//!     async fn execute_batch(
//!         &self,
//!         tasks: &[Task],
//!         device: &str,
//!         shots: u32,
//!     ) -> HalResult<Vec<ProviderJobId>> {
//!         # todo!()
//!     }
//!
//!     async fn get_status(&self, job_id: &ProviderJobId) -> HalResult<ProviderJobStatus> {
//!         # todo!()
//!     }
//!
//!     async fn get_result(&self, job_id: &ProviderJobId) -> HalResult<JobResult> {
//!         # todo!()
//!     }
//! }
//! ```

pub mod device;
pub mod error;
pub mod job;
pub mod provider;
pub mod registry;
pub mod result;
pub mod task;

pub use device::{DeviceAvailability, DeviceDescriptor};
pub use error::{HalResult, ProviderError};
pub use job::{ProviderJobId, ProviderJobStatus};
pub use provider::{Provider, ProviderConfig, ProviderKind};
pub use registry::ProviderRegistry;
pub use result::JobResult;
pub use task::Task;
