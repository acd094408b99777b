//! Random tree construction: Full, Grow and ramped half-and-half.
//!
//! Trees are built top-down in pre-order straight into the node vector.
//! Under strong typing each draw is restricted to the type the parent slot
//! requires; when a position cannot be filled the partial subtree is popped
//! and the draw retried, and when retries run out the whole tree is rebuilt.

use crate::gp::context::TreeScope;
use crate::gp::individual::{Individual, TreeLayout};
use crate::gp::primitive_set::{ArityFilter, PrimitiveSet, PrimitiveSuperSet};
use crate::gp::tree::{Node, Tree};
use crate::gp::value::ValueType;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Draws tried for a single position before backtracking to its parent.
const POSITION_ATTEMPTS: usize = 4;

/// Tree construction algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitMethod {
    /// Every leaf at the same, randomly chosen depth.
    Full,
    /// Leaves anywhere between the minimum and maximum depth.
    Grow,
    /// Coin flip between Full and Grow for each tree.
    Half,
}

/// Initialization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitConfig {
    /// Construction algorithm.
    pub method: InitMethod,
    /// Minimum tree depth.
    pub min_depth: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Whole-tree rebuilds before giving up.
    pub attempts: usize,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            method: InitMethod::Half,
            min_depth: 2,
            max_depth: 5,
            attempts: 20,
        }
    }
}

impl InitConfig {
    /// Same settings with the depth range pulled under `max_depth`.
    #[must_use]
    pub fn capped(self, max_depth: usize) -> Self {
        let max_depth = self.max_depth.min(max_depth);
        Self {
            min_depth: self.min_depth.min(max_depth),
            max_depth,
            ..self
        }
    }
}

/// Failure to initialize an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// A layout slot names a primitive set that does not exist.
    MissingPrimitiveSet {
        /// Tree slot.
        tree: usize,
        /// Requested set.
        primitive_set_index: usize,
    },
    /// No valid tree was found within the attempt budget.
    Exhausted {
        /// Tree slot.
        tree: usize,
        /// Attempts made.
        attempts: usize,
    },
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::MissingPrimitiveSet {
                tree,
                primitive_set_index,
            } => write!(f, "tree {tree} uses missing primitive set {primitive_set_index}"),
            InitError::Exhausted { tree, attempts } => {
                write!(f, "could not build tree {tree} in {attempts} attempts")
            }
        }
    }
}

impl std::error::Error for InitError {}

struct Builder<'b, R> {
    set: &'b PrimitiveSet,
    scope: TreeScope,
    strong_typing: bool,
    rng: &'b mut R,
    nodes: Vec<Node>,
}

impl<R: Rng> Builder<'_, R> {
    /// Place one subtree whose root sits at `level`; a root has level 1.
    fn place(
        &mut self,
        level: usize,
        min_depth: usize,
        max_depth: usize,
        full: bool,
        required: Option<ValueType>,
    ) -> bool {
        let filter = if level >= max_depth {
            ArityFilter::Terminal
        } else if full || level < min_depth {
            ArityFilter::Branch
        } else {
            ArityFilter::Any
        };

        for _ in 0..POSITION_ATTEMPTS {
            let Some(primitive) = self.draw(filter, required) else {
                return false;
            };
            let mark = self.nodes.len();
            let arity = primitive.arity();
            self.nodes.push(Node::new(Arc::clone(&primitive)));

            let mut complete = true;
            for argument in 0..arity {
                let slot = if self.strong_typing {
                    primitive.arg_type(argument)
                } else {
                    None
                };
                if !self.place(level + 1, min_depth, max_depth, full, slot) {
                    complete = false;
                    break;
                }
            }
            if complete {
                self.nodes[mark].subtree_size = self.nodes.len() - mark;
                return true;
            }
            self.nodes.truncate(mark);
        }
        false
    }

    fn draw(
        &mut self,
        filter: ArityFilter,
        required: Option<ValueType>,
    ) -> Option<Arc<crate::gp::primitive::Primitive>> {
        let drawn = self.draw_exact(filter, required);
        // Sets without a suitable branch still produce (shallower) trees.
        let drawn = match (drawn, filter) {
            (None, ArityFilter::Branch) => self.draw_exact(ArityFilter::Terminal, required),
            (drawn, _) => drawn,
        };
        drawn?.instantiate(&self.scope, self.rng)
    }

    fn draw_exact(
        &mut self,
        filter: ArityFilter,
        required: Option<ValueType>,
    ) -> Option<Arc<crate::gp::primitive::Primitive>> {
        if self.strong_typing {
            self.set
                .select_with_type(filter, required, &self.scope, self.rng)
        } else {
            self.set.select(filter, &self.scope, self.rng)
        }
    }
}

/// Build a random subtree with sizes set, its root returning `root_type`.
///
/// `Half` is resolved by a coin flip; `Full` draws its leaf depth uniformly
/// from `[min_depth, max_depth]`. Returns `None` when `config.attempts`
/// rebuilds all fail.
pub fn generate_subtree<R: Rng>(
    set: &PrimitiveSet,
    scope: &TreeScope,
    config: &InitConfig,
    root_type: Option<ValueType>,
    strong_typing: bool,
    rng: &mut R,
) -> Option<Vec<Node>> {
    let max_depth = config.max_depth.max(1);
    let min_depth = config.min_depth.clamp(1, max_depth);
    let mut builder = Builder {
        set,
        scope: *scope,
        strong_typing,
        rng,
        nodes: Vec::with_capacity(1 << max_depth.min(8)),
    };
    for _ in 0..config.attempts.max(1) {
        let full = match config.method {
            InitMethod::Full => true,
            InitMethod::Grow => false,
            InitMethod::Half => builder.rng.gen_bool(0.5),
        };
        let (low, high) = if full {
            let target = builder.rng.gen_range(min_depth..=max_depth);
            (target, target)
        } else {
            (min_depth, max_depth)
        };
        builder.nodes.clear();
        let required = if strong_typing { root_type } else { None };
        if builder.place(1, low, high, full, required) {
            return Some(builder.nodes);
        }
    }
    tracing::trace!(attempts = config.attempts, "subtree generation exhausted");
    None
}

/// Replace the contents of `tree` with a freshly generated one.
///
/// Returns `false`, leaving `tree` unchanged, when generation fails.
pub fn init_tree<R: Rng>(
    tree: &mut Tree,
    set: &PrimitiveSet,
    scope: &TreeScope,
    config: &InitConfig,
    strong_typing: bool,
    rng: &mut R,
) -> bool {
    match generate_subtree(set, scope, config, tree.root_type(), strong_typing, rng) {
        Some(nodes) => {
            tree.set_nodes(nodes);
            true
        }
        None => false,
    }
}

/// Build an individual with one random tree per layout slot.
///
/// # Errors
///
/// Fails if a slot names a missing primitive set or a tree cannot be built.
pub fn init_individual<R: Rng>(
    layout: &[TreeLayout],
    sets: &PrimitiveSuperSet,
    config: &InitConfig,
    strong_typing: bool,
    rng: &mut R,
) -> Result<Individual, InitError> {
    let mut trees = Vec::with_capacity(layout.len());
    for (index, slot) in layout.iter().enumerate() {
        let set = sets
            .get(slot.primitive_set_index)
            .ok_or(InitError::MissingPrimitiveSet {
                tree: index,
                primitive_set_index: slot.primitive_set_index,
            })?;
        let scope = TreeScope {
            tree_index: index,
            number_arguments: slot.number_arguments,
            tree_count: layout.len(),
        };
        let mut tree = Tree::new(slot.primitive_set_index, slot.number_arguments)
            .with_root_type(set.root_type());
        if !init_tree(&mut tree, set, &scope, config, strong_typing, rng) {
            return Err(InitError::Exhausted {
                tree: index,
                attempts: config.attempts,
            });
        }
        trees.push(tree);
    }
    Ok(Individual::new(trees))
}

/// Build `size` individuals.
///
/// # Errors
///
/// Fails on the first individual that cannot be built.
pub fn init_population<R: Rng>(
    size: usize,
    layout: &[TreeLayout],
    sets: &PrimitiveSuperSet,
    config: &InitConfig,
    strong_typing: bool,
    rng: &mut R,
) -> Result<Vec<Individual>, InitError> {
    (0..size)
        .map(|_| init_individual(layout, sets, config, strong_typing, rng))
        .collect()
}
