//! Individuals: one or more trees evolved and evaluated together.
//!
//! Tree 0 is the result-producing branch; any further trees are
//! automatically defined functions it (or an earlier ADF) may invoke.

use crate::error::EvalResult;
use crate::gp::context::{Constraints, TreeScope, chance};
use crate::gp::interpret::{ExecContext, ExecutionLimits};
use crate::gp::primitive::{InvokerKind, Primitive};
use crate::gp::tree::{StructureError, Tree};
use crate::gp::value::Value;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of one tree slot of an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeLayout {
    /// Primitive set the tree draws from.
    pub primitive_set_index: usize,
    /// Formal parameters the tree takes when invoked.
    pub number_arguments: usize,
}

/// Whether a node takes arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Arity above zero.
    Branch,
    /// Arity zero.
    Leaf,
}

impl NodeKind {
    /// Kind of a node with `arity` arguments.
    #[must_use]
    pub fn of(arity: usize) -> Self {
        if arity > 0 { NodeKind::Branch } else { NodeKind::Leaf }
    }

    /// Draw `Branch` with probability `branch_probability`.
    pub fn sample<R: Rng>(branch_probability: f64, rng: &mut R) -> Self {
        if chance(rng, branch_probability) {
            NodeKind::Branch
        } else {
            NodeKind::Leaf
        }
    }
}

/// Restriction on which nodes a uniform node draw may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChoice {
    /// Any node.
    Any,
    /// Only nodes of this kind; nothing if there are none.
    Only(NodeKind),
    /// Nodes of this kind if there are any, otherwise any node.
    Prefer(NodeKind),
}

impl NodeChoice {
    fn admits(self, arity: usize) -> bool {
        match self {
            NodeChoice::Any => true,
            NodeChoice::Only(kind) | NodeChoice::Prefer(kind) => NodeKind::of(arity) == kind,
        }
    }
}

impl Tree {
    /// Uniformly pick a node index satisfying `choice`.
    pub fn random_node<R: Rng>(&self, choice: NodeChoice, rng: &mut R) -> Option<usize> {
        let count = self.nodes().iter().filter(|n| choice.admits(n.arity())).count();
        if count == 0 {
            return match choice {
                NodeChoice::Prefer(_) if !self.is_empty() => Some(rng.gen_range(0..self.len())),
                _ => None,
            };
        }
        let pick = rng.gen_range(0..count);
        self.nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| choice.admits(n.arity()))
            .nth(pick)
            .map(|(i, _)| i)
    }
}

/// A structural violation located in one tree of an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationError {
    /// Index of the offending tree.
    pub tree: usize,
    /// What is wrong with it.
    pub error: StructureError,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree {}: {}", self.tree, self.error)
    }
}

impl std::error::Error for ValidationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A candidate solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    /// Result-producing tree followed by its ADFs.
    pub trees: Vec<Tree>,
    /// Fitness from the last evaluation, if any.
    pub fitness: Option<f64>,
}

impl Individual {
    /// Wrap `trees` into an unevaluated individual.
    #[must_use]
    pub fn new(trees: Vec<Tree>) -> Self {
        Self {
            trees,
            fitness: None,
        }
    }

    /// Total node count over all trees.
    #[must_use]
    pub fn size(&self) -> usize {
        self.trees.iter().map(Tree::len).sum()
    }

    /// Scope used when placing primitives in tree `tree_index`.
    ///
    /// # Panics
    ///
    /// Panics if `tree_index` is out of range.
    #[must_use]
    pub fn scope(&self, tree_index: usize) -> TreeScope {
        TreeScope {
            tree_index,
            number_arguments: self.trees[tree_index].number_arguments(),
            tree_count: self.trees.len(),
        }
    }

    /// Check every tree against the structural invariants and `constraints`.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self, constraints: &Constraints) -> Result<(), ValidationError> {
        for (index, tree) in self.trees.iter().enumerate() {
            self.validate_tree(index, tree, constraints)
                .map_err(|error| ValidationError { tree: index, error })?;
        }
        Ok(())
    }

    fn validate_tree(
        &self,
        index: usize,
        tree: &Tree,
        constraints: &Constraints,
    ) -> Result<(), StructureError> {
        tree.validate()?;
        let depth = tree.depth();
        if depth > constraints.max_depth {
            return Err(StructureError::DepthExceeded {
                depth,
                max_depth: constraints.max_depth,
            });
        }
        if constraints.strong_typing {
            tree.validate_types()?;
        }
        for (node_index, node) in tree.nodes().iter().enumerate() {
            if let Primitive::Invoker(inv) = node.primitive.as_ref()
                && let (InvokerKind::Adf, Some(target)) = (&inv.kind, inv.index)
            {
                let callable = target > index
                    && self
                        .trees
                        .get(target)
                        .is_some_and(|t| t.number_arguments() == inv.arg_types.len());
                if !callable {
                    return Err(StructureError::InvalidInvocation {
                        index: node_index,
                        target,
                    });
                }
            }
        }
        Ok(())
    }

    /// Evaluate tree 0 once on `inputs` with a fresh context.
    ///
    /// # Errors
    ///
    /// Propagates interpretation errors.
    pub fn interpret(&self, inputs: &[Value], limits: ExecutionLimits) -> EvalResult<Value> {
        let mut context = ExecContext::new(self, limits);
        context.set_inputs(inputs);
        context.run()
    }

    /// Uniformly pick a node across the trees accepted by `eligible`.
    ///
    /// Returns `(tree index, node index)`.
    pub fn random_node<R: Rng>(
        &self,
        choice: NodeChoice,
        eligible: impl Fn(usize) -> bool,
        rng: &mut R,
    ) -> Option<(usize, usize)> {
        let eligible = &eligible;
        let candidates = move |choice: NodeChoice| {
            self.trees
                .iter()
                .enumerate()
                .filter(move |(t, _)| eligible(*t))
                .flat_map(move |(t, tree)| {
                    tree.nodes()
                        .iter()
                        .enumerate()
                        .filter(move |(_, n)| choice.admits(n.arity()))
                        .map(move |(i, _)| (t, i))
                })
        };
        let mut count = candidates(choice).count();
        let mut choice = choice;
        if count == 0 && matches!(choice, NodeChoice::Prefer(_)) {
            choice = NodeChoice::Any;
            count = candidates(choice).count();
        }
        if count == 0 {
            return None;
        }
        candidates(choice).nth(rng.gen_range(0..count))
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, tree) in self.trees.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "tree {index}: {tree}")?;
        }
        Ok(())
    }
}
