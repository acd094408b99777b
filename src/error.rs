//! Error types for tree interpretation.

use std::fmt;

/// Resource whose ceiling was crossed while interpreting an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Total number of primitive executions.
    NodesExecuted,
    /// Elapsed wall-clock time.
    ElapsedTime,
    /// Nesting depth of tree invocations (ADFs and modules).
    CallDepth,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::NodesExecuted => write!(f, "executed node count"),
            ResourceKind::ElapsedTime => write!(f, "elapsed time"),
            ResourceKind::CallDepth => write!(f, "invocation depth"),
        }
    }
}

/// Errors raised while interpreting a tree.
///
/// `ResourceExceeded` is an expected, per-individual outcome: the evaluation
/// loop assigns the individual a sentinel fitness and moves on. Every other
/// variant means the caller wired the evaluation up incorrectly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A configured execution ceiling was crossed.
    ResourceExceeded(ResourceKind),
    /// The tree to interpret has no nodes.
    EmptyTree,
    /// The tree is not the one designated active in the execution context.
    InactiveTree,
    /// A primitive asked for an argument it does not have.
    ArgumentOutOfRange {
        /// Requested argument.
        argument: usize,
        /// Arity of the primitive.
        arity: usize,
    },
    /// An argument reference found no matching value in the current frame.
    MissingArgument(usize),
    /// A generator placeholder reached execution without being resolved.
    UnresolvedPrimitive(String),
    /// An invoker pointed at a tree or module that does not exist.
    InvalidTarget {
        /// Name of the invoking primitive.
        name: String,
        /// Target index it resolved to.
        index: usize,
    },
    /// A variable read an input slot that was never bound.
    UnboundInput(usize),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::ResourceExceeded(kind) => write!(f, "{kind} limit exceeded"),
            EvalError::EmptyTree => write!(f, "cannot interpret an empty tree"),
            EvalError::InactiveTree => {
                write!(f, "tree is not the active tree of the execution context")
            }
            EvalError::ArgumentOutOfRange { argument, arity } => {
                write!(f, "argument {argument} requested from a primitive of arity {arity}")
            }
            EvalError::MissingArgument(index) => {
                write!(f, "argument {index} is not bound in the current call frame")
            }
            EvalError::UnresolvedPrimitive(name) => {
                write!(f, "primitive {name} was never resolved to a concrete index")
            }
            EvalError::InvalidTarget { name, index } => {
                write!(f, "{name} invokes missing target {index}")
            }
            EvalError::UnboundInput(slot) => write!(f, "input slot {slot} is not bound"),
        }
    }
}

impl std::error::Error for EvalError {}

impl EvalError {
    /// Whether this error is a resource ceiling breach rather than a wiring bug.
    #[must_use]
    pub fn is_resource_exceeded(&self) -> bool {
        matches!(self, EvalError::ResourceExceeded(_))
    }
}

/// Result type for interpretation steps.
pub type EvalResult<T> = Result<T, EvalError>;
