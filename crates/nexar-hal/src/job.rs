//! Provider-side job identifiers and statuses.
//!
//! Providers may hand back *composite* identifiers of the form `base:index`
//! when a batch submission maps to a single backend job. The index selects
//! one submission's slice of the batch result. Composite ids are parsed
//! defensively: an id without a valid numeric suffix is treated as opaque.

use serde::{Deserialize, Serialize};

/// Identifier returned by a provider for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderJobId(pub String);

impl ProviderJobId {
    /// Create a new provider job id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a composite id designating slot `index` of batch `base`.
    pub fn composite(base: impl Into<String>, index: usize) -> Self {
        Self(format!("{}:{}", base.into(), index))
    }

    /// The base portion of a composite id, or the whole id if not composite.
    pub fn base(&self) -> &str {
        match self.0.rsplit_once(':') {
            Some((base, idx)) if idx.parse::<usize>().is_ok() => base,
            _ => &self.0,
        }
    }

    /// The batch index of a composite id, if present.
    pub fn index(&self) -> Option<usize> {
        self.0
            .rsplit_once(':')
            .and_then(|(_, idx)| idx.parse::<usize>().ok())
    }
}

impl std::fmt::Display for ProviderJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProviderJobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProviderJobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a job as reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderJobStatus {
    /// Job is waiting in the provider's queue.
    Queued,
    /// Job is currently running.
    Running,
    /// Job completed successfully; a result is available.
    Completed,
    /// Job failed on the provider side.
    Failed,
    /// Job was cancelled.
    Cancelled,
    /// The provider cannot resolve the id.
    Unknown,
}

impl ProviderJobStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderJobStatus::Completed
                | ProviderJobStatus::Failed
                | ProviderJobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ProviderJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderJobStatus::Queued => "QUEUED",
            ProviderJobStatus::Running => "RUNNING",
            ProviderJobStatus::Completed => "COMPLETED",
            ProviderJobStatus::Failed => "FAILED",
            ProviderJobStatus::Cancelled => "CANCELLED",
            ProviderJobStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}
