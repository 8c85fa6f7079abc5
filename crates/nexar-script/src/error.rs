//! Error types for script parsing and evaluation.

use thiserror::Error;

/// Errors produced while parsing or evaluating a sandboxed script.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ScriptError {
    /// The source failed to tokenize or parse.
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// A name outside the sandbox namespace was referenced.
    ///
    /// The namespace is a whitelist; every unresolved name is rejected,
    /// including `open`, `eval`, `exec` and `__import__`.
    #[error("Use of disallowed name '{0}'")]
    DisallowedName(String),

    /// A statement form outside the sandboxed subset was used.
    #[error("Disallowed statement at line {line}: {message}")]
    DisallowedStatement { line: usize, message: String },

    /// A value was used with the wrong type.
    #[error("Type error: {0}")]
    Type(String),

    /// A function or method was called with the wrong arguments.
    #[error("Argument error in {func}: {message}")]
    Arity { func: String, message: String },

    /// A gate referenced a qubit or clbit outside the circuit.
    #[error("Index {index} out of range for {register} of size {size}")]
    IndexOutOfRange {
        register: &'static str,
        index: i64,
        size: u32,
    },

    /// Integer division or modulo by zero.
    #[error("Division by zero")]
    DivisionByZero,

    /// The script exceeded the evaluation step budget.
    #[error("Evaluation budget exceeded after {0} steps")]
    BudgetExceeded(u64),

    /// The script finished without binding a `circuit` symbol.
    #[error("Source must define a 'circuit' variable")]
    MissingCircuit,

    /// The `circuit` symbol is bound to a non-circuit value.
    #[error("'circuit' must be a QuantumCircuit, found {0}")]
    NotACircuit(String),
}

/// Result type for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
