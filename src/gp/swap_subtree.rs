//! Swap-subtree mutation: rearranging subtrees inside a single tree.
//!
//! Internal form: for a node `n1`, a branch `n2` strictly below it and a node
//! `n3` strictly below `n2`, the three subtrees rotate so that `n2`'s
//! subtree takes `n1`'s place, `n1`'s subtree hangs where `n3` was, and
//! `n3`'s subtree hangs where `n2` was:
//!
//! ```text
//! before: A( .. B( .. C .. ) .. )      after: B( .. A( .. C .. ) .. )
//! ```
//!
//! The rearranged span has exactly the same length as `n1`'s subtree, so it
//! is written back in place and no ancestor size changes.
//!
//! External form: two disjoint subtrees of the same tree trade places.

use crate::gp::context::{Constraints, chance};
use crate::gp::individual::Individual;
use crate::gp::tree::{Node, Tree, depth_in, fix_sizes_in};
use crate::gp::value::types_compatible;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Swap-subtree mutation settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwapSubtreeConfig {
    /// Probability of applying the operator to an offspring.
    pub probability: f64,
    /// Probability of the internal rotation rather than the external swap.
    pub internal_probability: f64,
}

impl Default for SwapSubtreeConfig {
    fn default() -> Self {
        Self {
            probability: 0.05,
            internal_probability: 0.5,
        }
    }
}

/// Apply one internal or external subtree swap to a random tree.
pub fn mutate_swap_subtree<R: Rng>(
    individual: &mut Individual,
    constraints: &Constraints,
    config: &SwapSubtreeConfig,
    rng: &mut R,
) -> bool {
    let candidates: Vec<usize> = (0..individual.trees.len())
        .filter(|&t| individual.trees[t].len() > 1)
        .collect();
    if candidates.is_empty() {
        return false;
    }
    for _ in 0..constraints.attempts.max(1) {
        let tree = &mut individual.trees[candidates[rng.gen_range(0..candidates.len())]];
        let applied = if chance(rng, config.internal_probability) {
            random_internal(tree, constraints, rng)
        } else {
            random_external(tree, constraints, rng)
        };
        if applied {
            individual.fitness = None;
            return true;
        }
    }
    tracing::trace!("swap-subtree mutation exhausted its attempts");
    false
}

fn random_internal<R: Rng>(tree: &mut Tree, constraints: &Constraints, rng: &mut R) -> bool {
    // n2: a branch below the root.
    let branches: Vec<usize> = (1..tree.len()).filter(|&i| tree.node(i).is_branch()).collect();
    if branches.is_empty() {
        return false;
    }
    let n2 = branches[rng.gen_range(0..branches.len())];
    let ancestors = tree.path_to_node(n2);
    let ancestors = ancestors.ancestors();
    let n1 = ancestors[rng.gen_range(0..ancestors.len())];
    let n3 = rng.gen_range(n2 + 1..n2 + tree.node(n2).subtree_size);
    swap_internal(tree, n1, n2, n3, constraints)
}

fn random_external<R: Rng>(tree: &mut Tree, constraints: &Constraints, rng: &mut R) -> bool {
    let first = rng.gen_range(1..tree.len());
    let disjoint: Vec<usize> = (1..tree.len())
        .filter(|&j| !tree.contains(first, j) && !tree.contains(j, first))
        .collect();
    if disjoint.is_empty() {
        return false;
    }
    let second = disjoint[rng.gen_range(0..disjoint.len())];
    swap_external(tree, first, second, constraints)
}

/// Rotate the subtrees at `n1`, `n2` and `n3` (see the module docs).
///
/// Returns `false`, leaving the tree untouched, if the result would break
/// the depth limit or, under strong typing, a slot type.
///
/// # Panics
///
/// Panics unless `n2` lies strictly below `n1` and `n3` strictly below `n2`.
pub fn swap_internal(
    tree: &mut Tree,
    n1: usize,
    n2: usize,
    n3: usize,
    constraints: &Constraints,
) -> bool {
    assert!(
        n1 < n2 && tree.contains(n1, n2) && n2 < n3 && tree.contains(n2, n3),
        "internal swap needs nested points, got {n1}, {n2}, {n3}"
    );
    let nodes = tree.nodes();
    let end1 = n1 + nodes[n1].subtree_size;
    let end2 = n2 + nodes[n2].subtree_size;
    let end3 = n3 + nodes[n3].subtree_size;

    let mut segment: Vec<Node> = Vec::with_capacity(end1 - n1);
    segment.extend_from_slice(&nodes[n2..n3]);
    segment.extend_from_slice(&nodes[n1..n2]);
    segment.extend_from_slice(&nodes[n3..end3]);
    segment.extend_from_slice(&nodes[end2..end1]);
    segment.extend_from_slice(&nodes[end3..end2]);
    fix_sizes_in(&mut segment, 0);

    let path = tree.path_to_node(n1);
    if path.depth() - 1 + depth_in(&segment, 0) > constraints.max_depth {
        return false;
    }
    if constraints.strong_typing {
        let mut rotated = Tree::new(tree.primitive_set_index(), tree.number_arguments())
            .with_root_type(tree.slot_type(&path));
        rotated.set_nodes(segment.clone());
        if rotated.validate_types().is_err() {
            return false;
        }
    }
    tree.replace_subtree(&path, &segment);
    true
}

/// Exchange the disjoint subtrees rooted at `a` and `b`.
///
/// Returns `false`, leaving the tree untouched, if the result would break
/// the depth limit or, under strong typing, a slot type.
///
/// # Panics
///
/// Panics if one subtree contains the other.
pub fn swap_external(tree: &mut Tree, a: usize, b: usize, constraints: &Constraints) -> bool {
    assert!(
        !tree.contains(a, b) && !tree.contains(b, a),
        "external swap needs disjoint subtrees, got {a} and {b}"
    );
    let (first, second) = if a < b { (a, b) } else { (b, a) };
    let path_first = tree.path_to_node(first);
    let path_second = tree.path_to_node(second);

    if path_first.depth() - 1 + tree.depth_at(second) > constraints.max_depth
        || path_second.depth() - 1 + tree.depth_at(first) > constraints.max_depth
    {
        return false;
    }
    if constraints.strong_typing {
        let first_type = tree.node(first).primitive.return_type();
        let second_type = tree.node(second).primitive.return_type();
        if !types_compatible(tree.slot_type(&path_first), second_type)
            || !types_compatible(tree.slot_type(&path_second), first_type)
        {
            return false;
        }
    }

    let first_nodes = tree.subtree(first).to_vec();
    let second_nodes = tree.subtree(second).to_vec();
    // The later span goes first so the earlier path stays valid.
    tree.replace_subtree(&path_second, &first_nodes);
    tree.replace_subtree(&path_first, &second_nodes);
    true
}
