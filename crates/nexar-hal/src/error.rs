//! Error types for the HAL crate.

use thiserror::Error;

/// Errors that can occur in provider operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// Provider or device is not reachable right now.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The named device is not known to the provider.
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// The submitted task cannot be executed (malformed payload, rejected
    /// source, shots out of range).
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Temporary failure; the caller may retry without side effects.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Permanent failure; the job cannot make progress.
    #[error("Permanent provider error: {0}")]
    Permanent(String),

    /// The provider does not implement the requested capability.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Whether the error leaves the job state unchanged and retryable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::Unavailable(_)
        )
    }
}

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, ProviderError>;
