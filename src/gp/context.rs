//! Structural context shared by the tree algorithms.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Ancestor chain from a tree's root down to the node under consideration.
///
/// The last entry is the node itself; everything before it are its
/// ancestors, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    nodes: Vec<usize>,
}

impl CallStack {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty stack with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Descend into node `index`.
    pub fn push(&mut self, index: usize) {
        self.nodes.push(index);
    }

    /// Ascend out of the current node.
    pub fn pop(&mut self) -> Option<usize> {
        self.nodes.pop()
    }

    /// Node currently on top.
    #[must_use]
    pub fn top(&self) -> Option<usize> {
        self.nodes.last().copied()
    }

    /// Parent of the node on top.
    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.nodes.len().checked_sub(2).map(|i| self.nodes[i])
    }

    /// Level of the node on top; the root sits at depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every ancestor of the node on top, root first.
    #[must_use]
    pub fn ancestors(&self) -> &[usize] {
        match self.nodes.split_last() {
            Some((_, ancestors)) => ancestors,
            None => &[],
        }
    }

    /// Whole chain, root first.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.nodes
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Where in an individual a primitive is being placed.
///
/// Argument and invoker selection weights depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeScope {
    /// Index of the tree being built or modified.
    pub tree_index: usize,
    /// Formal parameter count of that tree.
    pub number_arguments: usize,
    /// Number of trees in the individual.
    pub tree_count: usize,
}

impl TreeScope {
    /// Scope of a lone tree with no callable siblings.
    #[must_use]
    pub fn single(number_arguments: usize) -> Self {
        Self {
            tree_index: 0,
            number_arguments,
            tree_count: 1,
        }
    }
}

/// Structural limits every accepted variation must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Maximum tree depth (a single node has depth 1).
    pub max_depth: usize,
    /// Retries an operator makes before reporting that nothing changed.
    pub attempts: usize,
    /// Enforce return/argument type agreement between nodes.
    pub strong_typing: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_depth: 17,
            attempts: 2,
            strong_typing: false,
        }
    }
}

/// Bernoulli draw that reads a probability above one as one and anything
/// below zero, or NaN, as zero.
pub(crate) fn chance<R: Rng>(rng: &mut R, probability: f64) -> bool {
    let p = if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0)
    };
    rng.gen_bool(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_call_stack_ancestors() {
        let mut stack = CallStack::new();
        assert!(stack.ancestors().is_empty());
        stack.push(0);
        stack.push(1);
        stack.push(3);
        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.top(), Some(3));
        assert_eq!(stack.parent(), Some(1));
        assert_eq!(stack.ancestors(), &[0, 1]);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.parent(), Some(0));
    }

    #[test]
    fn test_chance_tolerates_out_of_range_probabilities() {
        let mut rng = SmallRng::seed_from_u64(8);
        for _ in 0..100 {
            assert!(chance(&mut rng, 1.5));
            assert!(!chance(&mut rng, -0.2));
            assert!(!chance(&mut rng, f64::NAN));
        }
        assert!(chance(&mut rng, f64::INFINITY));
    }
}
