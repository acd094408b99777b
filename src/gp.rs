//! Tree-based genetic programming.
//!
//! Individuals are lists of trees. Each tree lives in one flat pre-order
//! vector where every node records the size of its subtree, so subtrees are
//! contiguous slices and structural edits are slice splices.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │         Evolution Loop              │
//! ├─────────────────────────────────────┤
//! │  Selection │ Crossover │ Mutation   │
//! ├─────────────────────────────────────┤
//! │  Fitness Evaluation (Problem)       │
//! ├─────────────────────────────────────┤
//! │  Tree Interpreter │ Initialization  │
//! ├─────────────────────────────────────┤
//! │  Tree │ Primitive │ PrimitiveSet    │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use arbor::gp::{EvolutionConfig, evolve};
//! use arbor::problem::EvenParity;
//!
//! let problem = EvenParity::new(3, false)?;
//! let outcome = evolve(&problem, &EvolutionConfig::default())?;
//! println!("{}", outcome.best);
//! ```

mod context;
mod crossover;
mod document;
mod evolution;
mod fitness;
mod individual;
mod init;
mod interpret;
mod mutation;
mod persistence;
mod primitive;
mod primitive_set;
mod selection;
mod swap_subtree;
mod tree;
mod value;

pub use context::{CallStack, Constraints, TreeScope};
pub use crossover::{CrossoverConfig, crossover, exchange_subtrees};
pub use document::{DocumentError, IndividualDocument, NodeDocument, TreeDocument};
pub use evolution::{
    EvolutionConfig, EvolutionError, EvolutionOutcome, EvolutionStats, GenerationStats, evolve,
    evolve_with,
};
pub use fitness::{FitnessConfig, Problem, evaluate_individual, evaluate_population};
pub use individual::{Individual, NodeChoice, NodeKind, TreeLayout, ValidationError};
pub use init::{
    InitConfig, InitError, InitMethod, generate_subtree, init_individual, init_population,
    init_tree,
};
pub use interpret::{Arguments, ExecContext, ExecutionLimits};
pub use mutation::{
    MutationConfig, ShrinkMutationConfig, StandardMutationConfig, SwapMutationConfig, mutate,
    mutate_shrink, mutate_standard, mutate_swap, shrink_at, swap_at,
};
pub use persistence::{LoadError, load_document, load_individual, save_document, save_individual};
pub use primitive::{Argument, EphemeralKind, Invoker, InvokerKind, ModulePool, Op, Primitive};
pub use primitive_set::{ArityFilter, PrimitiveSet, PrimitiveSetError, PrimitiveSuperSet, Roulette};
pub use selection::{
    SelectionConfig, SelectionResult, SelectionStats, select_elite, select_parents,
    tournament_select,
};
pub use swap_subtree::{SwapSubtreeConfig, mutate_swap_subtree, swap_external, swap_internal};
pub use tree::{Children, Node, StructureError, Tree, child_index_in, depth_in, fix_sizes_in};
pub use value::{Value, ValueType, types_compatible};
