//! Mutation operators for genetic programming.
//!
//! Three single-point mutations live here: Standard (regrow a subtree),
//! Shrink (hoist one argument over its parent) and Swap (relabel a node with
//! another primitive of the same arity). Swap-subtree has its own module.
//! Every operator retries up to `Constraints::attempts` times and reports
//! `false` when it could not apply a valid change.

use crate::gp::context::{Constraints, TreeScope, chance};
use crate::gp::individual::{Individual, NodeChoice, NodeKind};
use crate::gp::init::{InitConfig, InitMethod, generate_subtree};
use crate::gp::primitive::Primitive;
use crate::gp::primitive_set::{ArityFilter, PrimitiveSet, PrimitiveSuperSet};
use crate::gp::swap_subtree::{SwapSubtreeConfig, mutate_swap_subtree};
use crate::gp::tree::Tree;
use crate::gp::value::types_compatible;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Standard (subtree regeneration) mutation settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StandardMutationConfig {
    /// Probability of applying the operator to an offspring.
    pub probability: f64,
    /// Deepest subtree the operator grows, before the depth limit applies.
    pub max_regeneration_depth: usize,
    /// Algorithm used to grow the replacement.
    pub method: InitMethod,
}

impl Default for StandardMutationConfig {
    fn default() -> Self {
        Self {
            probability: 0.05,
            max_regeneration_depth: 5,
            method: InitMethod::Grow,
        }
    }
}

/// Shrink mutation settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShrinkMutationConfig {
    /// Probability of applying the operator to an offspring.
    pub probability: f64,
}

impl Default for ShrinkMutationConfig {
    fn default() -> Self {
        Self { probability: 0.05 }
    }
}

/// Swap (node relabelling) mutation settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwapMutationConfig {
    /// Probability of applying the operator to an offspring.
    pub probability: f64,
    /// Probability of aiming at a branch rather than a leaf.
    pub distribution_probability: f64,
}

impl Default for SwapMutationConfig {
    fn default() -> Self {
        Self {
            probability: 0.05,
            distribution_probability: 0.5,
        }
    }
}

/// Configuration for mutation operations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Subtree regeneration.
    pub standard: StandardMutationConfig,
    /// Argument hoisting.
    pub shrink: ShrinkMutationConfig,
    /// Node relabelling.
    pub swap: SwapMutationConfig,
    /// Subtree rotation and exchange within one tree.
    pub swap_subtree: SwapSubtreeConfig,
}

/// Mutate an individual in place, rolling each operator's probability in turn.
///
/// Returns how many operators changed the individual.
pub fn mutate<R: Rng>(
    individual: &mut Individual,
    sets: &PrimitiveSuperSet,
    constraints: &Constraints,
    config: &MutationConfig,
    rng: &mut R,
) -> usize {
    let mut applied = 0;
    if chance(rng, config.standard.probability)
        && mutate_standard(individual, sets, constraints, &config.standard, rng)
    {
        applied += 1;
    }
    if chance(rng, config.shrink.probability) && mutate_shrink(individual, constraints, rng) {
        applied += 1;
    }
    if chance(rng, config.swap.probability)
        && mutate_swap(individual, sets, constraints, &config.swap, rng)
    {
        applied += 1;
    }
    if chance(rng, config.swap_subtree.probability)
        && mutate_swap_subtree(individual, constraints, &config.swap_subtree, rng)
    {
        applied += 1;
    }
    if applied > 0 {
        individual.fitness = None;
    }
    applied
}

/// Replace a random subtree with a freshly grown one.
///
/// The replacement is at most `max_regeneration_depth` deep and never pushes
/// the tree past `constraints.max_depth`.
pub fn mutate_standard<R: Rng>(
    individual: &mut Individual,
    sets: &PrimitiveSuperSet,
    constraints: &Constraints,
    config: &StandardMutationConfig,
    rng: &mut R,
) -> bool {
    for _ in 0..constraints.attempts.max(1) {
        let Some((t, n)) = individual.random_node(NodeChoice::Any, |_| true, rng) else {
            return false;
        };
        let scope = individual.scope(t);
        let tree = &mut individual.trees[t];
        let Some(set) = sets.get(tree.primitive_set_index()) else {
            return false;
        };
        let path = tree.path_to_node(n);
        let budget = (constraints.max_depth + 1)
            .saturating_sub(path.depth())
            .min(config.max_regeneration_depth);
        if budget == 0 {
            continue;
        }
        let required = if constraints.strong_typing {
            tree.slot_type(&path)
        } else {
            None
        };
        let init = InitConfig {
            method: config.method,
            min_depth: 1,
            max_depth: budget,
            attempts: constraints.attempts.max(1),
        };
        let Some(replacement) =
            generate_subtree(set, &scope, &init, required, constraints.strong_typing, rng)
        else {
            continue;
        };
        tree.replace_subtree(&path, &replacement);
        individual.fitness = None;
        return true;
    }
    tracing::trace!("standard mutation exhausted its attempts");
    false
}

/// Replace a random branch node with one of its own arguments.
///
/// A no-op on individuals without branch nodes.
pub fn mutate_shrink<R: Rng>(
    individual: &mut Individual,
    constraints: &Constraints,
    rng: &mut R,
) -> bool {
    for _ in 0..constraints.attempts.max(1) {
        let Some((t, n)) =
            individual.random_node(NodeChoice::Only(NodeKind::Branch), |_| true, rng)
        else {
            return false;
        };
        let tree = &mut individual.trees[t];
        let argument = rng.gen_range(0..tree.node(n).arity());
        if shrink_at(tree, n, argument, constraints.strong_typing) {
            individual.fitness = None;
            return true;
        }
    }
    tracing::trace!("shrink mutation exhausted its attempts");
    false
}

/// Hoist argument `argument` of node `index` into that node's place.
///
/// Under strong typing the hoisted subtree must fit the slot it moves into;
/// returns `false` without touching the tree otherwise.
///
/// # Panics
///
/// Panics if `argument` is not below the node's arity.
pub fn shrink_at(tree: &mut Tree, index: usize, argument: usize, strong_typing: bool) -> bool {
    let path = tree.path_to_node(index);
    let child = tree.child_index(index, argument);
    if strong_typing
        && !types_compatible(tree.slot_type(&path), tree.node(child).primitive.return_type())
    {
        return false;
    }
    let hoisted = tree.subtree(child).to_vec();
    tree.replace_subtree(&path, &hoisted);
    true
}

/// Relabel a random node with a different primitive of the same arity.
pub fn mutate_swap<R: Rng>(
    individual: &mut Individual,
    sets: &PrimitiveSuperSet,
    constraints: &Constraints,
    config: &SwapMutationConfig,
    rng: &mut R,
) -> bool {
    for _ in 0..constraints.attempts.max(1) {
        let kind = NodeKind::sample(config.distribution_probability, rng);
        let Some((t, n)) = individual.random_node(NodeChoice::Prefer(kind), |_| true, rng) else {
            return false;
        };
        let scope = individual.scope(t);
        let tree = &mut individual.trees[t];
        let Some(set) = sets.get(tree.primitive_set_index()) else {
            return false;
        };
        if swap_at(tree, n, set, &scope, constraints.strong_typing, rng) {
            individual.fitness = None;
            return true;
        }
    }
    tracing::trace!("swap mutation exhausted its attempts");
    false
}

/// Replace the primitive of node `index`, keeping its children.
///
/// The replacement comes from `set`, has the same arity and a different
/// name, and under strong typing fits both the parent slot and every child.
pub fn swap_at<R: Rng>(
    tree: &mut Tree,
    index: usize,
    set: &PrimitiveSet,
    scope: &TreeScope,
    strong_typing: bool,
    rng: &mut R,
) -> bool {
    let current = &tree.node(index).primitive;
    let arity = current.arity();
    let (required, child_types) = if strong_typing {
        let path = tree.path_to_node(index);
        let child_types: Vec<_> = tree
            .children(index)
            .map(|c| tree.node(c).primitive.return_type())
            .collect();
        (tree.slot_type(&path), child_types)
    } else {
        (None, Vec::new())
    };
    let accept = |candidate: &Primitive| {
        candidate.name() != current.name()
            && (!strong_typing
                || (types_compatible(required, candidate.return_type())
                    && child_types
                        .iter()
                        .enumerate()
                        .all(|(j, &ty)| types_compatible(candidate.arg_type(j), ty))))
    };
    let Some(replacement) = set
        .select_matching(ArityFilter::Exact(arity), scope, rng, accept)
        .and_then(|p| p.instantiate(scope, rng))
    else {
        return false;
    };
    tree.set_primitive(index, replacement);
    true
}
