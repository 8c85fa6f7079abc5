//! Error handling for the orchestrator.

use nexar_hal::ProviderError;
use thiserror::Error;

/// Result type for orchestrator operations.
pub type OrchResult<T> = Result<T, OrchError>;

/// Coarse error codes surfaced to callers over any transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed request, unknown provider/device, bad shots.
    InvalidRequest,
    /// Unknown job id.
    NotFound,
    /// Provider down, backpressure, or a retryable internal condition.
    Unavailable,
    /// Operation conflicts with the job's current state.
    Conflict,
    /// Persistent unexpected failure.
    Internal,
}

/// Errors that can occur during orchestrator operations.
#[derive(Error, Debug)]
pub enum OrchError {
    /// No provider registered under the requested name.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider does not expose the requested device.
    #[error("Unknown device '{device}' on provider '{provider}'")]
    UnknownDevice { provider: String, device: String },

    /// Shot count outside the accepted range.
    #[error("Invalid shots: {0}")]
    InvalidShots(String),

    /// Request is malformed in some other way.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Source-code submission to a provider without code execution.
    #[error("Provider '{0}' does not execute source code")]
    CodeExecutionUnsupported(String),

    /// The pending queue for the target device is full.
    #[error("Queue for {provider}/{device} is at its high-water mark")]
    Backpressure { provider: String, device: String },

    /// Job not found in the store.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Operation conflicts with the job's current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A state transition outside the lifecycle graph was attempted.
    #[error("Illegal transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// The caller-supplied deadline expired; job state is unchanged.
    #[error("Deadline expired: {0}")]
    DeadlineExpired(String),

    /// Provider error, classified by the provider.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Persistence error; the transition was aborted.
    #[error("Store error: {0}")]
    Store(String),

    /// SQLite database error.
    #[error("Database error: {0}")]
    Database(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The orchestrator is shutting down.
    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    /// Internal orchestrator error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchError {
    /// Map the error to its caller-facing code.
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchError::UnknownProvider(_)
            | OrchError::UnknownDevice { .. }
            | OrchError::InvalidShots(_)
            | OrchError::InvalidRequest(_)
            | OrchError::CodeExecutionUnsupported(_) => ErrorCode::InvalidRequest,
            OrchError::JobNotFound(_) => ErrorCode::NotFound,
            OrchError::Backpressure { .. }
            | OrchError::DeadlineExpired(_)
            | OrchError::Store(_)
            | OrchError::ShuttingDown => ErrorCode::Unavailable,
            OrchError::Conflict(_) => ErrorCode::Conflict,
            OrchError::Provider(e) => {
                if e.is_transient() {
                    ErrorCode::Unavailable
                } else {
                    match e {
                        ProviderError::InvalidDevice(_) | ProviderError::InvalidTask(_) => {
                            ErrorCode::InvalidRequest
                        }
                        _ => ErrorCode::Internal,
                    }
                }
            }
            OrchError::IllegalTransition { .. }
            | OrchError::Database(_)
            | OrchError::Json(_)
            | OrchError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the caller may retry without changing the request.
    pub fn is_transient(&self) -> bool {
        self.code() == ErrorCode::Unavailable
    }
}

impl From<rusqlite::Error> for OrchError {
    fn from(e: rusqlite::Error) -> Self {
        OrchError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            OrchError::UnknownProvider("x".into()).code(),
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            OrchError::JobNotFound("j".into()).code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            OrchError::Backpressure {
                provider: "p".into(),
                device: "d".into()
            }
            .code(),
            ErrorCode::Unavailable
        );
        assert_eq!(OrchError::Conflict("done".into()).code(), ErrorCode::Conflict);
        assert_eq!(
            OrchError::Internal("boom".into()).code(),
            ErrorCode::Internal
        );
    }

    #[test]
    fn test_provider_error_mapping() {
        let transient = OrchError::Provider(ProviderError::Transient("busy".into()));
        assert_eq!(transient.code(), ErrorCode::Unavailable);
        assert!(transient.is_transient());

        let invalid = OrchError::Provider(ProviderError::InvalidDevice("dev".into()));
        assert_eq!(invalid.code(), ErrorCode::InvalidRequest);

        let permanent = OrchError::Provider(ProviderError::Permanent("gone".into()));
        assert_eq!(permanent.code(), ErrorCode::Internal);
    }
}
