//! Runtime values produced by interpreting trees.

// Coercions between value families are intentionally lossy
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type tag used by strongly typed trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Boolean values.
    Bool,
    /// Signed 64-bit integers.
    Int,
    /// 64-bit floats.
    Float,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
        }
    }
}

/// Two optional type tags are compatible when either side does not care or both agree.
#[must_use]
pub fn types_compatible(required: Option<ValueType>, provided: Option<ValueType>) -> bool {
    match (required, provided) {
        (Some(required), Some(provided)) => required == provided,
        _ => true,
    }
}

/// A value flowing between primitives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
}

impl Value {
    /// Type tag of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
        }
    }

    /// Truthiness: non-zero numbers are true.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match *self {
            Value::Bool(b) => b,
            Value::Int(i) => i != 0,
            Value::Float(x) => x != 0.0,
        }
    }

    /// Integer view; floats truncate toward zero, booleans map to 0/1.
    #[must_use]
    pub fn as_int(&self) -> i64 {
        match *self {
            Value::Bool(b) => i64::from(b),
            Value::Int(i) => i,
            Value::Float(x) => x as i64,
        }
    }

    /// Float view; booleans map to 0.0/1.0.
    #[must_use]
    pub fn as_float(&self) -> f64 {
        match *self {
            Value::Bool(b) => f64::from(u8::from(b)),
            Value::Int(i) => i as f64,
            Value::Float(x) => x,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}
