//! Safelisted circuit-construction script frontend.
//!
//! Providers that accept raw source do so under a fixed sandbox contract:
//! a whitelist of builtins (`print`, container/number/string constructors,
//! `range`, `len`, `sum`, `min`, `max`, `abs`, `enumerate`, `zip`), a
//! whitelist of math names (`pi`, `sqrt`, `sin`, `cos`, `exp`, `log`), and
//! the circuit-construction primitives. There is no filesystem, network,
//! dynamic evaluation, or subprocess surface: the source is parsed into an
//! AST covering only the allowed subset and evaluated by a tree-walking
//! interpreter with a step budget.
//!
//! The source must bind a `circuit` variable to the constructed circuit;
//! a missing or wrongly-typed binding is an error.
//!
//! # Example
//!
//! ```
//! let source = r#"
//! circuit = QuantumCircuit(2, 2)
//! circuit.h(0)
//! circuit.cx(0, 1)
//! circuit.measure_all()
//! "#;
//!
//! let evaluation = nexar_script::evaluate(source).unwrap();
//! assert_eq!(evaluation.circuit.num_qubits, 2);
//! ```

pub mod ast;
pub mod circuit;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;

pub use circuit::{ScriptCircuit, ScriptOp, MAX_QUBITS};
pub use error::{ScriptError, ScriptResult};
pub use interp::{Evaluation, Interpreter};
pub use parser::parse;

/// Parse and evaluate a sandboxed script in one call.
pub fn evaluate(source: &str) -> ScriptResult<Evaluation> {
    let stmts = parse(source)?;
    Interpreter::new().run(&stmts)
}
