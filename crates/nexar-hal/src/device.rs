//! Device descriptors and availability.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Description of a single backend device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device name, unique within its provider.
    pub name: String,
    /// Number of qubits (0 for classical devices).
    pub num_qubits: u32,
    /// Names of the natively supported basis gates.
    #[serde(default)]
    pub basis_gates: Vec<String>,
    /// Qubit coupling as an adjacency list.
    #[serde(default)]
    pub coupling_map: FxHashMap<u32, Vec<u32>>,
    /// Whether the device is currently operational.
    pub is_operational: bool,
    /// Number of jobs waiting in the device queue.
    pub pending_jobs: u32,
    /// Whether this device is a simulator.
    pub is_simulator: bool,
    /// Maximum number of shots per job.
    pub max_shots: u32,
}

impl DeviceDescriptor {
    /// Create a descriptor for a simulator device.
    pub fn simulator(name: impl Into<String>, num_qubits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            basis_gates: Vec::new(),
            coupling_map: FxHashMap::default(),
            is_operational: true,
            pending_jobs: 0,
            is_simulator: true,
            max_shots: 100_000,
        }
    }

    /// Create a descriptor for a hardware device with a linear coupling map.
    pub fn hardware(name: impl Into<String>, num_qubits: u32) -> Self {
        let mut coupling_map = FxHashMap::default();
        for q in 0..num_qubits {
            let mut neighbours = Vec::new();
            if q > 0 {
                neighbours.push(q - 1);
            }
            if q + 1 < num_qubits {
                neighbours.push(q + 1);
            }
            coupling_map.insert(q, neighbours);
        }
        Self {
            name: name.into(),
            num_qubits,
            basis_gates: vec!["rz".into(), "sx".into(), "x".into(), "cx".into()],
            coupling_map,
            is_operational: true,
            pending_jobs: 0,
            is_simulator: false,
            max_shots: 100_000,
        }
    }
}

/// Snapshot of a device's availability.
///
/// Ephemeral; recomputed on every check. A device is available iff it is
/// operational and its pending-jobs count is below the queue threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAvailability {
    /// Device name.
    pub device_name: String,
    /// Whether the device is operational.
    pub is_operational: bool,
    /// Number of jobs waiting in the device queue.
    pub pending_jobs: u32,
    /// Queue depth above which the device counts as unavailable.
    pub queue_threshold: u32,
}

impl DeviceAvailability {
    /// Availability gate: operational and below the queue threshold.
    pub fn is_available(&self) -> bool {
        self.is_operational && self.pending_jobs < self.queue_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_gate() {
        let mut avail = DeviceAvailability {
            device_name: "dev".into(),
            is_operational: true,
            pending_jobs: 10,
            queue_threshold: 50,
        };
        assert!(avail.is_available());

        avail.pending_jobs = 50;
        assert!(!avail.is_available());

        avail.pending_jobs = 10;
        avail.is_operational = false;
        assert!(!avail.is_available());
    }

    #[test]
    fn test_hardware_coupling_map() {
        let dev = DeviceDescriptor::hardware("qpu", 3);
        assert_eq!(dev.coupling_map.get(&0), Some(&vec![1]));
        assert_eq!(dev.coupling_map.get(&1), Some(&vec![0, 2]));
        assert_eq!(dev.coupling_map.get(&2), Some(&vec![1]));
    }
}
