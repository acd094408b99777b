//! CLI command implementations for Arbor.

pub(crate) mod evolve;
pub(crate) mod show;

use std::error::Error;
use std::fmt;

/// CLI error type.
#[derive(Debug)]
pub(crate) struct CliError {
    message: String,
}

impl CliError {
    /// Create a new CLI error.
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<arbor::gp::PrimitiveSetError> for CliError {
    fn from(e: arbor::gp::PrimitiveSetError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<arbor::gp::EvolutionError> for CliError {
    fn from(e: arbor::gp::EvolutionError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<arbor::gp::LoadError> for CliError {
    fn from(e: arbor::gp::LoadError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<arbor::EvalError> for CliError {
    fn from(e: arbor::EvalError) -> Self {
        Self::new(e.to_string())
    }
}
