//! Provider trait and configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceAvailability, DeviceDescriptor};
use crate::error::{HalResult, ProviderError};
use crate::job::{ProviderJobId, ProviderJobStatus};
use crate::result::JobResult;
use crate::task::Task;

/// Kind of workload a provider executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Quantum circuit execution.
    Quantum,
    /// Classical code execution.
    Classical,
}

/// Construction-time settings for a provider instance.
///
/// Adapters read the fields they understand and take anything
/// backend-specific from `extra`. Credentials are opaque to the
/// orchestrator and are never serialized back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry name the provider is created under.
    pub name: String,
    /// API endpoint URL, for remote backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Backend credential, opaque to the HAL.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Pending-jobs count above which the provider reports its devices
    /// unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_threshold: Option<u32>,
    /// Backend-specific settings.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProviderConfig {
    /// Create a configuration for the named provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: None,
            token: None,
            queue_threshold: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Set the endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the backend credential.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the availability queue threshold.
    pub fn with_queue_threshold(mut self, threshold: u32) -> Self {
        self.queue_threshold = Some(threshold);
        self
    }

    /// Add a backend-specific setting.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Trait for compute providers.
///
/// Quantum and classical providers present the same operations and differ
/// only in the task payloads they accept. All operations may fail with
/// [`ProviderError`]; transient errors leave no side effects and may be
/// retried by the caller.
///
/// # Source-code execution
///
/// Providers that advertise [`supports_code_execution`](Self::supports_code_execution)
/// accept raw source through [`execute_code`](Self::execute_code) under the
/// documented sandbox restrictions: whitelisted builtins and math names,
/// circuit-construction primitives, no filesystem, network, dynamic
/// evaluation, or subprocess access. The source must bind a `circuit`
/// symbol; a missing or wrongly-typed symbol is an
/// [`InvalidTask`](ProviderError::InvalidTask) error.
///
/// # Composite job ids
///
/// A batch submission may return composite ids of the form `base:i`. The
/// provider must accept composite ids on [`get_status`](Self::get_status)
/// and [`get_result`](Self::get_result) by splitting off the index.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// The kind of workload this provider executes.
    fn kind(&self) -> ProviderKind;

    /// List the devices this provider exposes.
    async fn list_devices(&self) -> HalResult<Vec<DeviceDescriptor>>;

    /// Check a device's availability.
    ///
    /// Must be cheap; stale reads are acceptable.
    async fn check_availability(&self, device: &str) -> HalResult<DeviceAvailability>;

    /// Submit a batch of tasks to a device in one provider call.
    ///
    /// The input must be non-empty; the output has the same length, with
    /// the i-th id bound to the i-th task.
    async fn execute_batch(
        &self,
        tasks: &[Task],
        device: &str,
        shots: u32,
    ) -> HalResult<Vec<ProviderJobId>>;

    /// Whether this provider accepts source-code tasks.
    fn supports_code_execution(&self) -> bool {
        false
    }

    /// Execute a source-code task under sandbox restrictions.
    async fn execute_code(
        &self,
        _source: &str,
        _device: &str,
        _shots: u32,
    ) -> HalResult<ProviderJobId> {
        Err(ProviderError::Unsupported(format!(
            "provider '{}' does not execute source code",
            self.name()
        )))
    }

    /// Get the status of a job.
    async fn get_status(&self, job_id: &ProviderJobId) -> HalResult<ProviderJobStatus>;

    /// Get the result of a completed job.
    async fn get_result(&self, job_id: &ProviderJobId) -> HalResult<JobResult>;

    /// Cancel a submitted job, if the provider supports it.
    async fn cancel(&self, _job_id: &ProviderJobId) -> HalResult<()> {
        Err(ProviderError::Unsupported(format!(
            "provider '{}' does not cancel submitted jobs",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::new("test")
            .with_endpoint("https://api.example.com")
            .with_token("secret-token")
            .with_queue_threshold(20)
            .with_extra("timeout", serde_json::json!(30));

        assert_eq!(config.name, "test");
        assert_eq!(config.endpoint, Some("https://api.example.com".to_string()));
        assert_eq!(config.token, Some("secret-token".to_string()));
        assert_eq!(config.queue_threshold, Some(20));
        assert!(config.extra.contains_key("timeout"));
    }

    #[test]
    fn test_token_never_serialized() {
        let config = ProviderConfig::new("test").with_token("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
