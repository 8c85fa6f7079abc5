//! Circuit value constructed by sandboxed scripts.

use serde::{Deserialize, Serialize};

use crate::error::{ScriptError, ScriptResult};

/// Hard cap on sandbox circuit width.
pub const MAX_QUBITS: u32 = 1024;

/// One operation recorded on a script circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    /// A gate application.
    Gate {
        name: String,
        qubits: Vec<u32>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        params: Vec<f64>,
    },
    /// A measurement of one qubit into one classical bit.
    Measure { qubit: u32, clbit: u32 },
    /// A barrier (no-op for execution purposes).
    Barrier,
}

/// A circuit built by a sandboxed script.
///
/// This is the hand-off value between the script frontend and a provider's
/// `execute_code` implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCircuit {
    /// Number of qubits.
    pub num_qubits: u32,
    /// Number of classical bits.
    pub num_clbits: u32,
    /// Recorded operations, in program order.
    pub ops: Vec<ScriptOp>,
}

impl ScriptCircuit {
    /// Create an empty circuit.
    pub fn new(num_qubits: u32, num_clbits: u32) -> ScriptResult<Self> {
        if num_qubits > MAX_QUBITS {
            return Err(ScriptError::Type(format!(
                "circuit width {num_qubits} exceeds the sandbox limit of {MAX_QUBITS}"
            )));
        }
        Ok(Self {
            num_qubits,
            num_clbits,
            ops: Vec::new(),
        })
    }

    fn check_qubit(&self, index: i64) -> ScriptResult<u32> {
        if index < 0 || index >= i64::from(self.num_qubits) {
            return Err(ScriptError::IndexOutOfRange {
                register: "qubits",
                index,
                size: self.num_qubits,
            });
        }
        Ok(index as u32)
    }

    fn check_clbit(&self, index: i64) -> ScriptResult<u32> {
        if index < 0 || index >= i64::from(self.num_clbits) {
            return Err(ScriptError::IndexOutOfRange {
                register: "clbits",
                index,
                size: self.num_clbits,
            });
        }
        Ok(index as u32)
    }

    /// Append a gate, validating its qubit operands.
    pub fn apply_gate(
        &mut self,
        name: &str,
        qubits: &[i64],
        params: Vec<f64>,
    ) -> ScriptResult<()> {
        let mut checked = Vec::with_capacity(qubits.len());
        for &q in qubits {
            checked.push(self.check_qubit(q)?);
        }
        if qubits.len() == 2 && checked[0] == checked[1] {
            return Err(ScriptError::Type(format!(
                "gate '{name}' requires two distinct qubits"
            )));
        }
        self.ops.push(ScriptOp::Gate {
            name: name.to_string(),
            qubits: checked,
            params,
        });
        Ok(())
    }

    /// Append a measurement of `qubit` into `clbit`.
    pub fn measure(&mut self, qubit: i64, clbit: i64) -> ScriptResult<()> {
        let qubit = self.check_qubit(qubit)?;
        let clbit = self.check_clbit(clbit)?;
        self.ops.push(ScriptOp::Measure { qubit, clbit });
        Ok(())
    }

    /// Measure every qubit into a matching classical bit, growing the
    /// classical register if needed.
    pub fn measure_all(&mut self) {
        if self.num_clbits < self.num_qubits {
            self.num_clbits = self.num_qubits;
        }
        for q in 0..self.num_qubits {
            self.ops.push(ScriptOp::Measure { qubit: q, clbit: q });
        }
    }

    /// Append a barrier.
    pub fn barrier(&mut self) {
        self.ops.push(ScriptOp::Barrier);
    }

    /// Number of recorded operations.
    pub fn depth_hint(&self) -> usize {
        self.ops.len()
    }
}
