// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! Arbor: a tree-based genetic programming engine.
//!
//! This crate provides:
//! - Linear pre-order tree storage with per-node subtree sizes
//! - Strongly or weakly typed primitive sets with biased roulette selection
//! - Full, Grow and ramped half-and-half initialization
//! - Crossover and the Standard, Shrink, Swap and swap-subtree mutations
//! - A resource-bounded interpreter with ADF and module invocation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     CLI (evolve / show)             │
//! ├─────────────────────────────────────┤
//! │     Problems (even-N parity)        │
//! ├─────────────────────────────────────┤
//! │     GP engine (gp)                  │
//! └─────────────────────────────────────┘
//! ```

pub mod error;
pub mod gp;
pub mod problem;

pub use error::{EvalError, EvalResult, ResourceKind};
pub use gp::{Individual, Primitive, PrimitiveSet, PrimitiveSuperSet, Problem, Tree};
