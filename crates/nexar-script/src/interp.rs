//! Tree-walking evaluator over a whitelisted namespace.
//!
//! The namespace is seeded with the sandbox whitelist and nothing else:
//! basic builtins, math names, and the circuit constructor. Every name
//! lookup that misses is a [`ScriptError::DisallowedName`]; there is no
//! filesystem, network, or dynamic-evaluation surface to reach.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{BinOp, CmpOp, Expr, Stmt};
use crate::circuit::ScriptCircuit;
use crate::error::{ScriptError, ScriptResult};

/// Maximum number of statements plus loop iterations per evaluation.
const STEP_BUDGET: u64 = 100_000;

/// Gate table: name, qubit operands, angle parameters.
const GATES: &[(&str, usize, usize)] = &[
    ("h", 1, 0),
    ("x", 1, 0),
    ("y", 1, 0),
    ("z", 1, 0),
    ("s", 1, 0),
    ("t", 1, 0),
    ("sx", 1, 0),
    ("cx", 2, 0),
    ("cz", 2, 0),
    ("swap", 2, 0),
    ("rx", 1, 1),
    ("ry", 1, 1),
    ("rz", 1, 1),
];

/// Whitelisted builtin functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Range,
    Len,
    Sum,
    Min,
    Max,
    Abs,
    Enumerate,
    Zip,
    Int,
    Float,
    Str,
    List,
    Sqrt,
    Sin,
    Cos,
    Exp,
    Log,
    QuantumCircuit,
}

impl Builtin {
    fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Range => "range",
            Builtin::Len => "len",
            Builtin::Sum => "sum",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Abs => "abs",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Str => "str",
            Builtin::List => "list",
            Builtin::Sqrt => "sqrt",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::QuantumCircuit => "QuantumCircuit",
        }
    }
}

/// Runtime values.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    Range { start: i64, stop: i64, step: i64 },
    Circuit(Rc<RefCell<ScriptCircuit>>),
    Builtin(Builtin),
    Method {
        circuit: Rc<RefCell<ScriptCircuit>>,
        name: String,
    },
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Range { .. } => "range",
            Value::Circuit(_) => "QuantumCircuit",
            Value::Builtin(_) => "builtin",
            Value::Method { .. } => "method",
        }
    }

    fn display(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => if *v { "True" } else { "False" }.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::display).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Range { start, stop, step } => format!("range({start}, {stop}, {step})"),
            Value::Circuit(c) => {
                let c = c.borrow();
                format!("QuantumCircuit({}, {})", c.num_qubits, c.num_clbits)
            }
            Value::Builtin(b) => format!("<builtin {}>", b.name()),
            Value::Method { name, .. } => format!("<method {name}>"),
        }
    }

    fn truthy(&self) -> ScriptResult<bool> {
        Ok(match self {
            Value::Bool(v) => *v,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Range { start, stop, step } => range_len(*start, *stop, *step) > 0,
            other => {
                return Err(ScriptError::Type(format!(
                    "cannot use {} in a condition",
                    other.type_name()
                )));
            }
        })
    }

    fn as_int(&self, context: &str) -> ScriptResult<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Bool(v) => Ok(i64::from(*v)),
            other => Err(ScriptError::Type(format!(
                "{context} expects an int, found {}",
                other.type_name()
            ))),
        }
    }

    fn as_float(&self, context: &str) -> ScriptResult<f64> {
        match self {
            Value::Int(v) => Ok(*v as f64),
            Value::Float(v) => Ok(*v),
            Value::Bool(v) => Ok(f64::from(u8::from(*v))),
            other => Err(ScriptError::Type(format!(
                "{context} expects a number, found {}",
                other.type_name()
            ))),
        }
    }
}

fn range_len(start: i64, stop: i64, step: i64) -> u64 {
    // i128 arithmetic: extreme bounds must saturate, not overflow.
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let len = if step > 0 && stop > start {
        (stop - start + step - 1) / step
    } else if step < 0 && stop < start {
        (start - stop - step - 1) / -step
    } else {
        0
    };
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Completed evaluation of a script.
#[derive(Debug)]
pub struct Evaluation {
    /// The circuit bound to the `circuit` symbol.
    pub circuit: ScriptCircuit,
    /// Lines printed by the script, in order.
    pub stdout: Vec<String>,
}

/// The sandboxed evaluator.
pub struct Interpreter {
    env: FxHashMap<String, Value>,
    steps: u64,
    stdout: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create an interpreter with the whitelist namespace seeded.
    pub fn new() -> Self {
        let mut env = FxHashMap::default();

        for builtin in [
            Builtin::Print,
            Builtin::Range,
            Builtin::Len,
            Builtin::Sum,
            Builtin::Min,
            Builtin::Max,
            Builtin::Abs,
            Builtin::Enumerate,
            Builtin::Zip,
            Builtin::Int,
            Builtin::Float,
            Builtin::Str,
            Builtin::List,
            Builtin::Sqrt,
            Builtin::Sin,
            Builtin::Cos,
            Builtin::Exp,
            Builtin::Log,
            Builtin::QuantumCircuit,
        ] {
            env.insert(builtin.name().to_string(), Value::Builtin(builtin));
        }
        env.insert("pi".to_string(), Value::Float(std::f64::consts::PI));

        Self {
            env,
            steps: 0,
            stdout: Vec::new(),
        }
    }

    /// Run a parsed script and extract its `circuit` binding.
    pub fn run(mut self, stmts: &[Stmt]) -> ScriptResult<Evaluation> {
        self.exec_block(stmts)?;

        match self.env.get("circuit") {
            Some(Value::Circuit(rc)) => Ok(Evaluation {
                circuit: rc.borrow().clone(),
                stdout: self.stdout,
            }),
            Some(other) => Err(ScriptError::NotACircuit(other.type_name().to_string())),
            None => Err(ScriptError::MissingCircuit),
        }
    }

    fn tick(&mut self) -> ScriptResult<()> {
        self.steps += 1;
        if self.steps > STEP_BUDGET {
            return Err(ScriptError::BudgetExceeded(STEP_BUDGET));
        }
        Ok(())
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> ScriptResult<()> {
        for stmt in stmts {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> ScriptResult<()> {
        self.tick()?;
        match stmt {
            Stmt::Assign { name, value, .. } => {
                let value = self.eval(value)?;
                self.env.insert(name.clone(), value);
                Ok(())
            }
            Stmt::Expr { expr, .. } => {
                self.eval(expr)?;
                Ok(())
            }
            Stmt::For {
                var, iter, body, ..
            } => {
                let iterable = self.eval(iter)?;
                let items = self.iterate(&iterable)?;
                for item in items {
                    self.tick()?;
                    self.env.insert(var.clone(), item);
                    self.exec_block(body)?;
                }
                Ok(())
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                if self.eval(cond)?.truthy()? {
                    self.exec_block(then_body)
                } else {
                    self.exec_block(else_body)
                }
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(v) => Ok(Value::Bool(*v)),
            Expr::Name(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::DisallowedName(name.clone())),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::List(values))
            }
            Expr::Attr { obj, name } => {
                let obj = self.eval(obj)?;
                match obj {
                    Value::Circuit(circuit) => Ok(Value::Method {
                        circuit,
                        name: name.clone(),
                    }),
                    other => Err(ScriptError::Type(format!(
                        "attribute access is only supported on circuits, found {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?.as_int("index")?;
                match obj {
                    Value::List(items) => {
                        let len = items.len() as i64;
                        let resolved = if index < 0 { index + len } else { index };
                        if resolved < 0 || resolved >= len {
                            return Err(ScriptError::Type(format!(
                                "list index {index} out of range for length {len}"
                            )));
                        }
                        Ok(items[resolved as usize].clone())
                    }
                    other => Err(ScriptError::Type(format!(
                        "cannot index {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::BinOp { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                eval_binop(*op, &lhs, &rhs)
            }
            Expr::Compare { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                eval_compare(*op, &lhs, &rhs)
            }
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Int(v) => Ok(Value::Int(-v)),
                Value::Float(v) => Ok(Value::Float(-v)),
                other => Err(ScriptError::Type(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            Expr::Call { callee, args } => {
                let callee = self.eval(callee)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                match callee {
                    Value::Builtin(builtin) => self.call_builtin(builtin, values),
                    Value::Method { circuit, name } => call_method(&circuit, &name, values),
                    other => Err(ScriptError::Type(format!(
                        "{} is not callable",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    fn iterate(&self, value: &Value) -> ScriptResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.clone()),
            Value::Range { start, stop, step } => {
                let len = range_len(*start, *stop, *step);
                if len > STEP_BUDGET {
                    return Err(ScriptError::BudgetExceeded(STEP_BUDGET));
                }
                let mut items = Vec::with_capacity(len as usize);
                let mut current = *start;
                for _ in 0..len {
                    items.push(Value::Int(current));
                    current = current.wrapping_add(*step);
                }
                Ok(items)
            }
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            other => Err(ScriptError::Type(format!(
                "{} is not iterable",
                other.type_name()
            ))),
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> ScriptResult<Value> {
        let arity = |expected: &str| -> ScriptError {
            ScriptError::Arity {
                func: builtin.name().to_string(),
                message: format!("expected {expected}, got {} arguments", args.len()),
            }
        };

        match builtin {
            Builtin::Print => {
                let line: Vec<String> = args.iter().map(Value::display).collect();
                self.stdout.push(line.join(" "));
                Ok(Value::Bool(true))
            }
            Builtin::Range => {
                let (start, stop, step) = match args.len() {
                    1 => (0, args[0].as_int("range")?, 1),
                    2 => (args[0].as_int("range")?, args[1].as_int("range")?, 1),
                    3 => (
                        args[0].as_int("range")?,
                        args[1].as_int("range")?,
                        args[2].as_int("range")?,
                    ),
                    _ => return Err(arity("1 to 3")),
                };
                if step == 0 {
                    return Err(ScriptError::Type("range step must not be zero".into()));
                }
                Ok(Value::Range { start, stop, step })
            }
            Builtin::Len => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                let len = match value {
                    Value::Str(s) => s.chars().count() as i64,
                    Value::List(items) => items.len() as i64,
                    Value::Range { start, stop, step } => range_len(*start, *stop, *step) as i64,
                    other => {
                        return Err(ScriptError::Type(format!(
                            "len expects a sequence, found {}",
                            other.type_name()
                        )));
                    }
                };
                Ok(Value::Int(len))
            }
            Builtin::Sum => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                let items = self.iterate(value)?;
                let mut int_total = 0i64;
                let mut float_total = 0f64;
                let mut is_float = false;
                for item in &items {
                    match item {
                        Value::Int(v) => int_total += v,
                        Value::Float(v) => {
                            is_float = true;
                            float_total += v;
                        }
                        other => {
                            return Err(ScriptError::Type(format!(
                                "sum expects numbers, found {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                if is_float {
                    Ok(Value::Float(float_total + int_total as f64))
                } else {
                    Ok(Value::Int(int_total))
                }
            }
            Builtin::Min | Builtin::Max => {
                let items = if args.len() == 1 {
                    self.iterate(&args[0])?
                } else if args.len() >= 2 {
                    args.clone()
                } else {
                    return Err(arity("1 iterable or 2+ values"));
                };
                if items.is_empty() {
                    return Err(ScriptError::Type(format!(
                        "{} of an empty sequence",
                        builtin.name()
                    )));
                }
                let mut best = items[0].as_float(builtin.name())?;
                let mut best_value = items[0].clone();
                for item in &items[1..] {
                    let v = item.as_float(builtin.name())?;
                    let better = if builtin == Builtin::Min {
                        v < best
                    } else {
                        v > best
                    };
                    if better {
                        best = v;
                        best_value = item.clone();
                    }
                }
                Ok(best_value)
            }
            Builtin::Abs => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                match value {
                    Value::Int(v) => Ok(Value::Int(v.abs())),
                    Value::Float(v) => Ok(Value::Float(v.abs())),
                    other => Err(ScriptError::Type(format!(
                        "abs expects a number, found {}",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Enumerate => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                let items = self.iterate(value)?;
                Ok(Value::List(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| Value::List(vec![Value::Int(i as i64), v]))
                        .collect(),
                ))
            }
            Builtin::Zip => {
                if args.len() < 2 {
                    return Err(arity("2+"));
                }
                let mut sequences = Vec::with_capacity(args.len());
                for arg in &args {
                    sequences.push(self.iterate(arg)?);
                }
                let shortest = sequences.iter().map(Vec::len).min().unwrap_or(0);
                let mut zipped = Vec::with_capacity(shortest);
                for i in 0..shortest {
                    zipped.push(Value::List(
                        sequences.iter().map(|seq| seq[i].clone()).collect(),
                    ));
                }
                Ok(Value::List(zipped))
            }
            Builtin::Int => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                match value {
                    Value::Int(v) => Ok(Value::Int(*v)),
                    Value::Float(v) => Ok(Value::Int(*v as i64)),
                    Value::Bool(v) => Ok(Value::Int(i64::from(*v))),
                    Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                        ScriptError::Type(format!("cannot convert '{s}' to int"))
                    }),
                    other => Err(ScriptError::Type(format!(
                        "cannot convert {} to int",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Float => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                match value {
                    Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                        ScriptError::Type(format!("cannot convert '{s}' to float"))
                    }),
                    other => other.as_float("float").map(Value::Float),
                }
            }
            Builtin::Str => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                Ok(Value::Str(value.display()))
            }
            Builtin::List => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                Ok(Value::List(self.iterate(value)?))
            }
            Builtin::Sqrt | Builtin::Sin | Builtin::Cos | Builtin::Exp | Builtin::Log => {
                let [value] = args.as_slice() else {
                    return Err(arity("1"));
                };
                let v = value.as_float(builtin.name())?;
                let out = match builtin {
                    Builtin::Sqrt => {
                        if v < 0.0 {
                            return Err(ScriptError::Type("math domain error in sqrt".into()));
                        }
                        v.sqrt()
                    }
                    Builtin::Sin => v.sin(),
                    Builtin::Cos => v.cos(),
                    Builtin::Exp => v.exp(),
                    Builtin::Log => {
                        if v <= 0.0 {
                            return Err(ScriptError::Type("math domain error in log".into()));
                        }
                        v.ln()
                    }
                    _ => unreachable!(),
                };
                Ok(Value::Float(out))
            }
            Builtin::QuantumCircuit => {
                let (num_qubits, num_clbits) = match args.len() {
                    1 => (args[0].as_int("QuantumCircuit")?, 0),
                    2 => (
                        args[0].as_int("QuantumCircuit")?,
                        args[1].as_int("QuantumCircuit")?,
                    ),
                    _ => return Err(arity("1 or 2")),
                };
                if num_qubits < 0 || num_clbits < 0 {
                    return Err(ScriptError::Type(
                        "circuit register sizes must be non-negative".into(),
                    ));
                }
                let circuit = ScriptCircuit::new(num_qubits as u32, num_clbits as u32)?;
                Ok(Value::Circuit(Rc::new(RefCell::new(circuit))))
            }
        }
    }
}

fn call_method(
    circuit: &Rc<RefCell<ScriptCircuit>>,
    name: &str,
    args: Vec<Value>,
) -> ScriptResult<Value> {
    if let Some(&(gate, num_qubits, num_params)) =
        GATES.iter().find(|(gate, _, _)| *gate == name)
    {
        let expected = num_qubits + num_params;
        if args.len() != expected {
            return Err(ScriptError::Arity {
                func: gate.to_string(),
                message: format!("expected {expected} arguments, got {}", args.len()),
            });
        }
        // Angle parameters come first, then qubit operands (qiskit layout).
        let mut params = Vec::with_capacity(num_params);
        for arg in &args[..num_params] {
            params.push(arg.as_float(gate)?);
        }
        let mut qubits = Vec::with_capacity(num_qubits);
        for arg in &args[num_params..] {
            qubits.push(arg.as_int(gate)?);
        }
        circuit.borrow_mut().apply_gate(gate, &qubits, params)?;
        return Ok(Value::Bool(true));
    }

    match name {
        "measure" => {
            let [qubit, clbit] = args.as_slice() else {
                return Err(ScriptError::Arity {
                    func: "measure".to_string(),
                    message: format!("expected 2 arguments, got {}", args.len()),
                });
            };
            circuit
                .borrow_mut()
                .measure(qubit.as_int("measure")?, clbit.as_int("measure")?)?;
            Ok(Value::Bool(true))
        }
        "measure_all" => {
            if !args.is_empty() {
                return Err(ScriptError::Arity {
                    func: "measure_all".to_string(),
                    message: format!("expected no arguments, got {}", args.len()),
                });
            }
            circuit.borrow_mut().measure_all();
            Ok(Value::Bool(true))
        }
        "barrier" => {
            circuit.borrow_mut().barrier();
            Ok(Value::Bool(true))
        }
        other => Err(ScriptError::DisallowedName(format!("circuit.{other}"))),
    }
}

fn eval_binop(op: BinOp, lhs: &Value, rhs: &Value) -> ScriptResult<Value> {
    // String and list concatenation.
    if op == BinOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
        if let (Value::List(a), Value::List(b)) = (lhs, rhs) {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            return Ok(Value::List(out));
        }
    }

    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinOp::Add => Ok(Value::Int(a + b)),
            BinOp::Sub => Ok(Value::Int(a - b)),
            BinOp::Mul => Ok(Value::Int(a * b)),
            BinOp::Div => {
                if *b == 0 {
                    Err(ScriptError::DivisionByZero)
                } else {
                    Ok(Value::Float(*a as f64 / *b as f64))
                }
            }
            BinOp::Mod => {
                if *b == 0 {
                    Err(ScriptError::DivisionByZero)
                } else {
                    Ok(Value::Int(a.rem_euclid(*b)))
                }
            }
        },
        _ => {
            let a = lhs.as_float("arithmetic")?;
            let b = rhs.as_float("arithmetic")?;
            match op {
                BinOp::Add => Ok(Value::Float(a + b)),
                BinOp::Sub => Ok(Value::Float(a - b)),
                BinOp::Mul => Ok(Value::Float(a * b)),
                BinOp::Div => {
                    if b == 0.0 {
                        Err(ScriptError::DivisionByZero)
                    } else {
                        Ok(Value::Float(a / b))
                    }
                }
                BinOp::Mod => {
                    if b == 0.0 {
                        Err(ScriptError::DivisionByZero)
                    } else {
                        Ok(Value::Float(a.rem_euclid(b)))
                    }
                }
            }
        }
    }
}

fn eval_compare(op: CmpOp, lhs: &Value, rhs: &Value) -> ScriptResult<Value> {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => {
            let a = lhs.as_float("comparison");
            let b = rhs.as_float("comparison");
            match (a, b) {
                (Ok(a), Ok(b)) => a.partial_cmp(&b),
                // Mismatched types: equality is decidable, ordering is not.
                _ => match op {
                    CmpOp::Eq => return Ok(Value::Bool(false)),
                    CmpOp::NotEq => return Ok(Value::Bool(true)),
                    _ => {
                        return Err(ScriptError::Type(format!(
                            "cannot order {} and {}",
                            lhs.type_name(),
                            rhs.type_name()
                        )));
                    }
                },
            }
        }
    };

    let Some(ordering) = ordering else {
        return Ok(Value::Bool(matches!(op, CmpOp::NotEq)));
    };

    let result = match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::NotEq => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ScriptOp;
    use crate::parser::parse;

    fn eval(source: &str) -> ScriptResult<Evaluation> {
        Interpreter::new().run(&parse(source)?)
    }

    #[test]
    fn test_bell_pair() {
        let source = "\
circuit = QuantumCircuit(2, 2)
circuit.h(0)
circuit.cx(0, 1)
circuit.measure(0, 0)
circuit.measure(1, 1)
";
        let eval = eval(source).unwrap();
        assert_eq!(eval.circuit.num_qubits, 2);
        assert_eq!(eval.circuit.num_clbits, 2);
        assert_eq!(eval.circuit.ops.len(), 4);
        assert_eq!(
            eval.circuit.ops[0],
            ScriptOp::Gate {
                name: "h".into(),
                qubits: vec![0],
                params: vec![]
            }
        );
    }

    #[test]
    fn test_loop_and_math() {
        let source = "\
circuit = QuantumCircuit(3)
for i in range(3):
    circuit.rx(pi / 2, i)
circuit.measure_all()
";
        let eval = eval(source).unwrap();
        assert_eq!(eval.circuit.ops.len(), 6);
        let ScriptOp::Gate { name, params, .. } = &eval.circuit.ops[0] else {
            panic!("expected a gate");
        };
        assert_eq!(name, "rx");
        assert!((params[0] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_missing_circuit() {
        let err = eval("qc = QuantumCircuit(2)").unwrap_err();
        assert_eq!(err, ScriptError::MissingCircuit);
    }

    #[test]
    fn test_wrong_type_circuit() {
        let err = eval("circuit = \"not a circuit\"").unwrap_err();
        assert!(matches!(err, ScriptError::NotACircuit(_)));
    }

    #[test]
    fn test_disallowed_open() {
        let err = eval("circuit = open(\"/etc/passwd\")").unwrap_err();
        assert_eq!(err, ScriptError::DisallowedName("open".into()));
    }

    #[test]
    fn test_disallowed_dunder_import() {
        let err = eval("circuit = __import__(\"os\")").unwrap_err();
        assert_eq!(err, ScriptError::DisallowedName("__import__".into()));
    }

    #[test]
    fn test_budget_exceeded() {
        let source = "\
circuit = QuantumCircuit(1)
for i in range(200000):
    x = i
";
        let err = eval(source).unwrap_err();
        assert!(matches!(err, ScriptError::BudgetExceeded(_)));
    }

    #[test]
    fn test_sqrt_and_builtins() {
        let source = "\
angles = [sqrt(2), cos(0), abs(-1)]
circuit = QuantumCircuit(1)
for theta in angles:
    circuit.ry(theta, 0)
";
        let eval = eval(source).unwrap();
        assert_eq!(eval.circuit.ops.len(), 3);
    }

    #[test]
    fn test_enumerate_zip() {
        let source = "\
circuit = QuantumCircuit(4)
for pair in enumerate([10, 20]):
    circuit.h(pair[0])
for pair in zip([0, 1], [2, 3]):
    circuit.cx(pair[0], pair[1])
";
        let eval = eval(source).unwrap();
        assert_eq!(eval.circuit.ops.len(), 4);
    }

    #[test]
    fn test_print_captured() {
        let source = "\
circuit = QuantumCircuit(1)
print(\"width\", len([1]))
";
        let eval = eval(source).unwrap();
        assert_eq!(eval.stdout, vec!["width 1"]);
    }

    #[test]
    fn test_if_else_branches() {
        let source = "\
n = 3
circuit = QuantumCircuit(n)
if n > 2:
    circuit.h(0)
else:
    circuit.x(0)
";
        let eval = eval(source).unwrap();
        let ScriptOp::Gate { name, .. } = &eval.circuit.ops[0] else {
            panic!("expected a gate");
        };
        assert_eq!(name, "h");
    }

    #[test]
    fn test_unknown_gate_method() {
        let err = eval("circuit = QuantumCircuit(1)\ncircuit.toffoli(0)").unwrap_err();
        assert!(matches!(err, ScriptError::DisallowedName(_)));
    }
}
