//! Subtree crossover between two individuals.
//!
//! A node is drawn from anywhere in the first individual, a compatible node
//! from the partner, and the two subtrees trade places. Each node draw is
//! biased towards branches or leaves by `distribution_probability`.

use crate::gp::context::Constraints;
use crate::gp::individual::{Individual, NodeChoice, NodeKind};
use crate::gp::primitive::{InvokerKind, Primitive};
use crate::gp::tree::{Node, Tree};
use crate::gp::value::types_compatible;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration for crossover operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrossoverConfig {
    /// Probability that a selected pair undergoes crossover at all.
    pub probability: f64,
    /// Probability of aiming each crossover point at a branch rather than a leaf.
    pub distribution_probability: f64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            probability: 0.9,
            distribution_probability: 0.9,
        }
    }
}

/// Exchange the subtree at `ia` in `a` with the subtree at `ib` in `b`.
///
/// Ancestor sizes on both sides are patched through their root paths.
///
/// # Panics
///
/// Panics if either index is out of range.
pub fn exchange_subtrees(a: &mut Tree, ia: usize, b: &mut Tree, ib: usize) {
    let path_a = a.path_to_node(ia);
    let path_b = b.path_to_node(ib);
    let from_a = a.subtree(ia).to_vec();
    let from_b = b.replace_subtree(&path_b, &from_a);
    a.replace_subtree(&path_a, &from_b);
}

/// Whether every ADF call in `nodes` stays legal inside tree `tree_index`.
pub(crate) fn invocations_valid(nodes: &[Node], tree_index: usize, tree_count: usize) -> bool {
    nodes.iter().all(|node| match node.primitive.as_ref() {
        Primitive::Invoker(inv) => match (&inv.kind, inv.index) {
            (InvokerKind::Adf, Some(target)) => target > tree_index && target < tree_count,
            _ => true,
        },
        _ => true,
    })
}

/// Cross `a` and `b` in place.
///
/// Returns `false`, leaving both untouched, when no valid pair of points was
/// found within `constraints.attempts` tries.
pub fn crossover<R: Rng>(
    a: &mut Individual,
    b: &mut Individual,
    constraints: &Constraints,
    config: &CrossoverConfig,
    rng: &mut R,
) -> bool {
    for _ in 0..constraints.attempts.max(1) {
        let kind = NodeKind::sample(config.distribution_probability, rng);
        let Some((ta, na)) = a.random_node(NodeChoice::Prefer(kind), |_| true, rng) else {
            return false;
        };
        let host = &a.trees[ta];
        let partner_eligible = |t: usize| {
            let candidate = &b.trees[t];
            candidate.primitive_set_index() == host.primitive_set_index()
                && candidate.number_arguments() == host.number_arguments()
        };
        let kind = NodeKind::sample(config.distribution_probability, rng);
        let Some((tb, nb)) = b.random_node(NodeChoice::Prefer(kind), partner_eligible, rng) else {
            // No tree of the partner shares this tree's primitive set.
            continue;
        };

        if !points_compatible(a, ta, na, b, tb, nb, constraints) {
            continue;
        }
        let (tree_a, tree_b) = (&mut a.trees[ta], &mut b.trees[tb]);
        exchange_subtrees(tree_a, na, tree_b, nb);
        a.fitness = None;
        b.fitness = None;
        return true;
    }
    tracing::trace!(attempts = constraints.attempts, "crossover found no compatible points");
    false
}

fn points_compatible(
    a: &Individual,
    ta: usize,
    na: usize,
    b: &Individual,
    tb: usize,
    nb: usize,
    constraints: &Constraints,
) -> bool {
    let (tree_a, tree_b) = (&a.trees[ta], &b.trees[tb]);
    let path_a = tree_a.path_to_node(na);
    let path_b = tree_b.path_to_node(nb);

    // The rest of each host keeps its depth; only the grafted branch can grow.
    if path_a.depth() - 1 + tree_b.depth_at(nb) > constraints.max_depth
        || path_b.depth() - 1 + tree_a.depth_at(na) > constraints.max_depth
    {
        return false;
    }

    if constraints.strong_typing {
        let fits_a = types_compatible(
            tree_a.slot_type(&path_a),
            tree_b.node(nb).primitive.return_type(),
        );
        let fits_b = types_compatible(
            tree_b.slot_type(&path_b),
            tree_a.node(na).primitive.return_type(),
        );
        if !fits_a || !fits_b {
            return false;
        }
    }

    ta == tb
        || (invocations_valid(tree_b.subtree(nb), ta, a.trees.len())
            && invocations_valid(tree_a.subtree(na), tb, b.trees.len()))
}
