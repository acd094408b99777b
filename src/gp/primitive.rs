//! Primitives: the operators and terminals that label tree nodes.
//!
//! A primitive is one of a closed set of variants. Operators and terminals
//! are plain values shared by reference between every node that uses them.
//! Arguments, ephemeral constants and module invokers may start out as
//! *generators*: placeholders that [`Primitive::instantiate`] resolves into a
//! concrete index or value when a node is built.

// Selection weights and ephemeral draws use intentional casts
#![allow(clippy::cast_precision_loss)]

use crate::error::{EvalError, EvalResult};
use crate::gp::context::TreeScope;
use crate::gp::interpret::Arguments;
use crate::gp::tree::Tree;
use crate::gp::value::{Value, ValueType};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Built-in operator library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    // === Boolean ===
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
    /// Logical NOT.
    Not,
    /// Exclusive OR.
    Xor,
    /// Negated AND.
    Nand,
    /// Negated OR.
    Nor,
    /// If-then-else; only the taken branch is evaluated.
    If,

    // === Arithmetic ===
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Protected division: division by zero yields 1.
    Div,
    /// Negation.
    Neg,
    /// Sine.
    Sin,
    /// Cosine.
    Cos,
    /// Protected exponential: overflow yields 0.
    Exp,
    /// Protected logarithm of the absolute value: log(0) yields 0.
    Log,
    /// Less than.
    Lt,
    /// Greater than.
    Gt,

    // === Bitwise ===
    /// Bitwise AND.
    BitAnd,
    /// Bitwise OR.
    BitOr,
    /// Bitwise XOR.
    BitXor,
    /// Bitwise NOT.
    BitNot,
}

const BOOL: Option<ValueType> = Some(ValueType::Bool);
const INT: Option<ValueType> = Some(ValueType::Int);
const FLOAT: Option<ValueType> = Some(ValueType::Float);

impl Op {
    /// Every operator in the library.
    pub const ALL: [Op; 22] = [
        Op::And,
        Op::Or,
        Op::Not,
        Op::Xor,
        Op::Nand,
        Op::Nor,
        Op::If,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Neg,
        Op::Sin,
        Op::Cos,
        Op::Exp,
        Op::Log,
        Op::Lt,
        Op::Gt,
        Op::BitAnd,
        Op::BitOr,
        Op::BitXor,
        Op::BitNot,
    ];

    /// Registered name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::Xor => "XOR",
            Op::Nand => "NAND",
            Op::Nor => "NOR",
            Op::If => "IF",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Neg => "NEG",
            Op::Sin => "SIN",
            Op::Cos => "COS",
            Op::Exp => "EXP",
            Op::Log => "LOG",
            Op::Lt => "LT",
            Op::Gt => "GT",
            Op::BitAnd => "BAND",
            Op::BitOr => "BOR",
            Op::BitXor => "BXOR",
            Op::BitNot => "BNOT",
        }
    }

    /// Number of arguments.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Op::Not | Op::Neg | Op::Sin | Op::Cos | Op::Exp | Op::Log | Op::BitNot => 1,
            Op::If => 3,
            _ => 2,
        }
    }

    /// Declared return type; `None` means the result type follows the branches.
    #[must_use]
    pub fn return_type(self) -> Option<ValueType> {
        match self {
            Op::And | Op::Or | Op::Not | Op::Xor | Op::Nand | Op::Nor | Op::Lt | Op::Gt => BOOL,
            Op::If => None,
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Neg
            | Op::Sin
            | Op::Cos
            | Op::Exp
            | Op::Log => FLOAT,
            Op::BitAnd | Op::BitOr | Op::BitXor | Op::BitNot => INT,
        }
    }

    /// Declared type of argument `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the operator's arity.
    #[must_use]
    pub fn arg_type(self, index: usize) -> Option<ValueType> {
        assert!(
            index < self.arity(),
            "argument {index} requested from {} of arity {}",
            self.name(),
            self.arity()
        );
        match self {
            Op::And | Op::Or | Op::Not | Op::Xor | Op::Nand | Op::Nor => BOOL,
            Op::If => {
                if index == 0 {
                    BOOL
                } else {
                    None
                }
            }
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Neg
            | Op::Sin
            | Op::Cos
            | Op::Exp
            | Op::Log
            | Op::Lt
            | Op::Gt => FLOAT,
            Op::BitAnd | Op::BitOr | Op::BitXor | Op::BitNot => INT,
        }
    }

    fn apply(self, args: &mut Arguments<'_, '_>) -> EvalResult<Value> {
        let value = match self {
            Op::And => Value::Bool(args.eval(0)?.as_bool() && args.eval(1)?.as_bool()),
            Op::Or => Value::Bool(args.eval(0)?.as_bool() || args.eval(1)?.as_bool()),
            Op::Not => Value::Bool(!args.eval(0)?.as_bool()),
            Op::Xor => Value::Bool(args.eval(0)?.as_bool() ^ args.eval(1)?.as_bool()),
            Op::Nand => Value::Bool(!(args.eval(0)?.as_bool() && args.eval(1)?.as_bool())),
            Op::Nor => Value::Bool(!(args.eval(0)?.as_bool() || args.eval(1)?.as_bool())),
            Op::If => {
                if args.eval(0)?.as_bool() {
                    args.eval(1)?
                } else {
                    args.eval(2)?
                }
            }
            Op::Add => Value::Float(args.eval(0)?.as_float() + args.eval(1)?.as_float()),
            Op::Sub => Value::Float(args.eval(0)?.as_float() - args.eval(1)?.as_float()),
            Op::Mul => Value::Float(args.eval(0)?.as_float() * args.eval(1)?.as_float()),
            Op::Div => {
                let numerator = args.eval(0)?.as_float();
                let denominator = args.eval(1)?.as_float();
                if denominator == 0.0 {
                    Value::Float(1.0)
                } else {
                    Value::Float(numerator / denominator)
                }
            }
            Op::Neg => Value::Float(-args.eval(0)?.as_float()),
            Op::Sin => Value::Float(args.eval(0)?.as_float().sin()),
            Op::Cos => Value::Float(args.eval(0)?.as_float().cos()),
            Op::Exp => {
                let result = args.eval(0)?.as_float().exp();
                Value::Float(if result.is_finite() { result } else { 0.0 })
            }
            Op::Log => {
                let x = args.eval(0)?.as_float().abs();
                Value::Float(if x == 0.0 { 0.0 } else { x.ln() })
            }
            Op::Lt => Value::Bool(args.eval(0)?.as_float() < args.eval(1)?.as_float()),
            Op::Gt => Value::Bool(args.eval(0)?.as_float() > args.eval(1)?.as_float()),
            Op::BitAnd => Value::Int(args.eval(0)?.as_int() & args.eval(1)?.as_int()),
            Op::BitOr => Value::Int(args.eval(0)?.as_int() | args.eval(1)?.as_int()),
            Op::BitXor => Value::Int(args.eval(0)?.as_int() ^ args.eval(1)?.as_int()),
            Op::BitNot => Value::Int(!args.eval(0)?.as_int()),
        };
        Ok(value)
    }
}

/// Distribution an ephemeral random constant is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EphemeralKind {
    /// Fair coin.
    Bool,
    /// Uniform integer in `[low, high]`.
    Int {
        /// Inclusive lower bound.
        low: i64,
        /// Inclusive upper bound.
        high: i64,
    },
    /// Uniform float in `[low, high)`.
    Float {
        /// Inclusive lower bound.
        low: f64,
        /// Exclusive upper bound.
        high: f64,
    },
}

impl EphemeralKind {
    /// Type of the values this distribution produces.
    #[must_use]
    pub fn value_type(self) -> ValueType {
        match self {
            EphemeralKind::Bool => ValueType::Bool,
            EphemeralKind::Int { .. } => ValueType::Int,
            EphemeralKind::Float { .. } => ValueType::Float,
        }
    }

    /// Draw one value.
    pub fn sample<R: Rng>(self, rng: &mut R) -> Value {
        match self {
            EphemeralKind::Bool => Value::Bool(rng.gen_bool(0.5)),
            EphemeralKind::Int { low, high } => Value::Int(rng.gen_range(low..=high.max(low))),
            EphemeralKind::Float { low, high } => {
                if high > low {
                    Value::Float(rng.gen_range(low..high))
                } else {
                    Value::Float(low)
                }
            }
        }
    }
}

/// Reference to a formal parameter of the enclosing invoked tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Registered name.
    pub name: String,
    /// Parameter index, or `None` for a generator.
    pub index: Option<usize>,
    /// Declared type.
    pub value_type: Option<ValueType>,
}

/// How an invoker locates the tree it calls.
#[derive(Debug, Clone)]
pub enum InvokerKind {
    /// Another tree of the same individual.
    Adf,
    /// A tree in an evolution-wide module pool.
    Module(Arc<ModulePool>),
}

/// A primitive that calls another tree.
#[derive(Debug, Clone)]
pub struct Invoker {
    /// Registered name.
    pub name: String,
    /// Resolution strategy.
    pub kind: InvokerKind,
    /// Target tree or module, or `None` for a module generator.
    pub index: Option<usize>,
    /// Declared return type.
    pub return_type: Option<ValueType>,
    /// Declared argument types; the length is the arity.
    pub arg_types: Vec<Option<ValueType>>,
}

impl PartialEq for Invoker {
    fn eq(&self, other: &Self) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (InvokerKind::Adf, InvokerKind::Adf) => true,
            (InvokerKind::Module(a), InvokerKind::Module(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_kind
            && self.name == other.name
            && self.index == other.index
            && self.return_type == other.return_type
            && self.arg_types == other.arg_types
    }
}

/// Pool of reusable trees shared across the whole evolution.
#[derive(Debug, Default)]
pub struct ModulePool {
    modules: RwLock<Vec<Arc<Tree>>>,
}

impl ModulePool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module and return its index.
    pub fn insert(&self, tree: Tree) -> usize {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        modules.push(Arc::new(tree));
        modules.len() - 1
    }

    /// Module at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Arc<Tree>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of modules taking exactly `arity` arguments.
    #[must_use]
    pub fn count_with_arity(&self, arity: usize) -> usize {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.number_arguments() == arity)
            .count()
    }

    /// Uniformly pick a module taking exactly `arity` arguments.
    pub fn random_with_arity<R: Rng>(&self, arity: usize, rng: &mut R) -> Option<usize> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        let matching: Vec<usize> = modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.number_arguments() == arity)
            .map(|(i, _)| i)
            .collect();
        if matching.is_empty() {
            None
        } else {
            Some(matching[rng.gen_range(0..matching.len())])
        }
    }
}

/// A node label: operator, terminal, argument reference or tree invoker.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Library operator.
    Operator(Op),
    /// Named constant.
    Constant {
        /// Registered name.
        name: String,
        /// Value produced.
        value: Value,
    },
    /// Input variable read from an execution-context slot.
    Variable {
        /// Registered name.
        name: String,
        /// Input slot.
        slot: usize,
        /// Declared type.
        value_type: Option<ValueType>,
    },
    /// Ephemeral random constant; `value` is `None` for the generator.
    Ephemeral {
        /// Registered name.
        name: String,
        /// Distribution of generated values.
        kind: EphemeralKind,
        /// Materialised value.
        value: Option<Value>,
    },
    /// Formal parameter reference.
    Argument(Argument),
    /// Tree invocation.
    Invoker(Invoker),
}

impl Primitive {
    /// Named constant.
    #[must_use]
    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        Primitive::Constant {
            name: name.into(),
            value,
        }
    }

    /// Input variable bound to `slot`.
    #[must_use]
    pub fn variable(name: impl Into<String>, slot: usize, value_type: Option<ValueType>) -> Self {
        Primitive::Variable {
            name: name.into(),
            slot,
            value_type,
        }
    }

    /// Ephemeral random constant generator.
    #[must_use]
    pub fn ephemeral(name: impl Into<String>, kind: EphemeralKind) -> Self {
        Primitive::Ephemeral {
            name: name.into(),
            kind,
            value: None,
        }
    }

    /// Argument generator named `ARG`; resolves to a random parameter index.
    #[must_use]
    pub fn argument(value_type: Option<ValueType>) -> Self {
        Primitive::Argument(Argument {
            name: "ARG".to_string(),
            index: None,
            value_type,
        })
    }

    /// Reference to a fixed parameter index.
    #[must_use]
    pub fn argument_at(index: usize, value_type: Option<ValueType>) -> Self {
        Primitive::Argument(Argument {
            name: "ARG".to_string(),
            index: Some(index),
            value_type,
        })
    }

    /// Invoker of tree `target` of the same individual.
    #[must_use]
    pub fn adf(
        name: impl Into<String>,
        target: usize,
        return_type: Option<ValueType>,
        arg_types: Vec<Option<ValueType>>,
    ) -> Self {
        Primitive::Invoker(Invoker {
            name: name.into(),
            kind: InvokerKind::Adf,
            index: Some(target),
            return_type,
            arg_types,
        })
    }

    /// Module invoker generator; resolves to a random module of matching arity.
    #[must_use]
    pub fn module(
        name: impl Into<String>,
        pool: Arc<ModulePool>,
        return_type: Option<ValueType>,
        arg_types: Vec<Option<ValueType>>,
    ) -> Self {
        Primitive::Invoker(Invoker {
            name: name.into(),
            kind: InvokerKind::Module(pool),
            index: None,
            return_type,
            arg_types,
        })
    }

    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Primitive::Operator(op) => op.name(),
            Primitive::Constant { name, .. }
            | Primitive::Variable { name, .. }
            | Primitive::Ephemeral { name, .. } => name,
            Primitive::Argument(arg) => &arg.name,
            Primitive::Invoker(inv) => &inv.name,
        }
    }

    /// Number of arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Primitive::Operator(op) => op.arity(),
            Primitive::Invoker(inv) => inv.arg_types.len(),
            _ => 0,
        }
    }

    /// Resolved slot index of argument references and invokers.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Primitive::Argument(arg) => arg.index,
            Primitive::Invoker(inv) => inv.index,
            _ => None,
        }
    }

    /// Whether this is a placeholder that must be resolved before execution.
    #[must_use]
    pub fn is_generator(&self) -> bool {
        match self {
            Primitive::Ephemeral { value, .. } => value.is_none(),
            Primitive::Argument(arg) => arg.index.is_none(),
            Primitive::Invoker(inv) => inv.index.is_none(),
            _ => false,
        }
    }

    /// Declared return type.
    #[must_use]
    pub fn return_type(&self) -> Option<ValueType> {
        match self {
            Primitive::Operator(op) => op.return_type(),
            Primitive::Constant { value, .. } => Some(value.value_type()),
            Primitive::Variable { value_type, .. } => *value_type,
            Primitive::Ephemeral { kind, .. } => Some(kind.value_type()),
            Primitive::Argument(arg) => arg.value_type,
            Primitive::Invoker(inv) => inv.return_type,
        }
    }

    /// Declared type of argument `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the arity.
    #[must_use]
    pub fn arg_type(&self, index: usize) -> Option<ValueType> {
        match self {
            Primitive::Operator(op) => op.arg_type(index),
            Primitive::Invoker(inv) => {
                assert!(
                    index < inv.arg_types.len(),
                    "argument {index} requested from {} of arity {}",
                    inv.name,
                    inv.arg_types.len()
                );
                inv.arg_types[index]
            }
            other => panic!("argument {index} requested from terminal {}", other.name()),
        }
    }

    /// Whether the selection weight is independent of the tree being built.
    #[must_use]
    pub fn is_weight_stable(&self) -> bool {
        !matches!(self, Primitive::Argument(_) | Primitive::Invoker(_))
    }

    /// Selection weight of this primitive, given its bias, at a position in `scope`.
    #[must_use]
    pub fn selection_weight(&self, bias: f64, scope: &TreeScope) -> f64 {
        let usable = match self {
            Primitive::Argument(arg) => match arg.index {
                Some(index) => index < scope.number_arguments,
                None => scope.number_arguments > 0,
            },
            Primitive::Invoker(inv) => match (&inv.kind, inv.index) {
                (InvokerKind::Adf, Some(target)) => {
                    target > scope.tree_index && target < scope.tree_count
                }
                (InvokerKind::Adf, None) => false,
                (InvokerKind::Module(pool), None) => {
                    pool.count_with_arity(inv.arg_types.len()) > 0
                }
                (InvokerKind::Module(pool), Some(index)) => index < pool.len(),
            },
            _ => true,
        };
        if usable { bias } else { 0.0 }
    }

    /// Resolve generators into the concrete primitive a node should reference.
    ///
    /// Non-generators are returned as another reference to the same instance.
    /// Returns `None` when a generator has nothing to resolve to in `scope`.
    pub fn instantiate<R: Rng>(
        self: &Arc<Self>,
        scope: &TreeScope,
        rng: &mut R,
    ) -> Option<Arc<Self>> {
        match self.as_ref() {
            Primitive::Ephemeral {
                name,
                kind,
                value: None,
            } => Some(Arc::new(Primitive::Ephemeral {
                name: name.clone(),
                kind: *kind,
                value: Some(kind.sample(rng)),
            })),
            Primitive::Argument(arg) if arg.index.is_none() => {
                if scope.number_arguments == 0 {
                    return None;
                }
                Some(Arc::new(Primitive::Argument(Argument {
                    index: Some(rng.gen_range(0..scope.number_arguments)),
                    ..arg.clone()
                })))
            }
            Primitive::Invoker(inv) if inv.index.is_none() => match &inv.kind {
                InvokerKind::Module(pool) => {
                    let index = pool.random_with_arity(inv.arg_types.len(), rng)?;
                    Some(Arc::new(Primitive::Invoker(Invoker {
                        index: Some(index),
                        ..inv.clone()
                    })))
                }
                InvokerKind::Adf => None,
            },
            _ => Some(Arc::clone(self)),
        }
    }

    /// Copy of this primitive bound to a concrete index, for decoding.
    #[must_use]
    pub fn with_index(&self, index: usize) -> Option<Self> {
        match self {
            Primitive::Argument(arg) => Some(Primitive::Argument(Argument {
                index: Some(index),
                ..arg.clone()
            })),
            Primitive::Invoker(inv) => Some(Primitive::Invoker(Invoker {
                index: Some(index),
                ..inv.clone()
            })),
            _ => None,
        }
    }

    /// Copy of an ephemeral generator holding `value`, for decoding.
    #[must_use]
    pub fn with_value(&self, value: Value) -> Option<Self> {
        match self {
            Primitive::Ephemeral { name, kind, .. } => Some(Primitive::Ephemeral {
                name: name.clone(),
                kind: *kind,
                value: Some(value),
            }),
            _ => None,
        }
    }

    /// Execute this primitive; children are evaluated on demand through `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource ceiling is crossed or the primitive is
    /// not executable in the current context.
    pub fn execute(&self, args: &mut Arguments<'_, '_>) -> EvalResult<Value> {
        match self {
            Primitive::Operator(op) => op.apply(args),
            Primitive::Constant { value, .. } => Ok(*value),
            Primitive::Variable { slot, .. } => args
                .context()
                .input(*slot)
                .ok_or(EvalError::UnboundInput(*slot)),
            Primitive::Ephemeral { name, value, .. } => {
                value.ok_or_else(|| EvalError::UnresolvedPrimitive(name.clone()))
            }
            Primitive::Argument(arg) => {
                let index = arg
                    .index
                    .ok_or_else(|| EvalError::UnresolvedPrimitive(arg.name.clone()))?;
                args.context()
                    .frame_argument(index)
                    .ok_or(EvalError::MissingArgument(index))
            }
            Primitive::Invoker(inv) => {
                let index = inv
                    .index
                    .ok_or_else(|| EvalError::UnresolvedPrimitive(inv.name.clone()))?;
                let mut values = Vec::with_capacity(args.arity());
                for i in 0..args.arity() {
                    values.push(args.eval(i)?);
                }
                match &inv.kind {
                    InvokerKind::Adf => args.context().invoke_tree(&inv.name, index, values),
                    InvokerKind::Module(pool) => {
                        let module = pool.get(index).ok_or_else(|| EvalError::InvalidTarget {
                            name: inv.name.clone(),
                            index,
                        })?;
                        args.context().invoke_module(&module, values)
                    }
                }
            }
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Ephemeral {
                value: Some(value), ..
            } => write!(f, "{value}"),
            Primitive::Argument(Argument {
                name,
                index: Some(index),
                ..
            })
            | Primitive::Invoker(Invoker {
                name,
                kind: InvokerKind::Module(_),
                index: Some(index),
                ..
            }) => write!(f, "{name}{index}"),
            other => write!(f, "{}", other.name()),
        }
    }
}
