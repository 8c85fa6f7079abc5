//! Task payloads accepted by providers.

use serde::{Deserialize, Serialize};

/// A unit of work handed to a provider.
///
/// The HAL does not interpret circuit payloads; they pass through to the
/// provider as structured JSON. Source-code tasks carry the raw source
/// string and are only accepted by providers that advertise
/// [`supports_code_execution`](crate::Provider::supports_code_execution).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Task {
    /// An opaque structured circuit.
    Circuit(serde_json::Value),
    /// Source text defining a circuit, executed under sandbox restrictions.
    SourceCode(String),
}

impl Task {
    /// Whether this task is a source-code task.
    pub fn is_source_code(&self) -> bool {
        matches!(self, Task::SourceCode(_))
    }

    /// The source string, if this is a source-code task.
    pub fn source(&self) -> Option<&str> {
        match self {
            Task::SourceCode(src) => Some(src),
            Task::Circuit(_) => None,
        }
    }
}
