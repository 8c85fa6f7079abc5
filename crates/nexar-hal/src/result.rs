//! Execution result payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of a completed job.
///
/// A flat map of provider-defined keys. Quantum providers conventionally
/// report measurement counts under bitstring keys; classical providers
/// report whatever their execution produced. Only defined when the
/// provider-side status is `Completed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    /// Provider-defined result entries.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl JobResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a result from measurement counts.
    pub fn from_counts(counts: impl IntoIterator<Item = (impl Into<String>, u64)>) -> Self {
        let mut data = Map::new();
        for (bitstring, count) in counts {
            data.insert(bitstring.into(), Value::from(count));
        }
        Self { data }
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Insert an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Whether the result carries no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_counts() {
        let result = JobResult::from_counts([("00", 500u64), ("11", 524u64)]);
        assert_eq!(result.get("00"), Some(&Value::from(500u64)));
        assert_eq!(result.get("11"), Some(&Value::from(524u64)));
        assert!(result.get("01").is_none());
    }

    #[test]
    fn test_flat_serialization() {
        let result = JobResult::from_counts([("00", 10u64)]);
        let json = serde_json::to_value(&result).unwrap();
        // Entries serialize at the top level, not nested under "data".
        assert_eq!(json["00"], 10);
    }
}
