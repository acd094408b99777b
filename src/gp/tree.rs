//! Linear, size-annotated tree storage.
//!
//! A tree is a flat vector of nodes in pre-order: every node is immediately
//! followed by the whole subtree of its first child, then the whole subtree
//! of its second child, and so on. Each node records the size of its own
//! subtree, which is enough to navigate to any child without pointers:
//!
//! ```text
//! AND(NOT(TRUE), FALSE)
//!
//! index         0     1     2     3
//! primitive    AND   NOT  TRUE  FALSE
//! subtree_size  4     2     1     1
//! ```
//!
//! Structural edits splice node ranges in and out of the vector and then
//! patch the sizes of the recorded ancestors, so a variation costs
//! O(old subtree + new subtree + depth) rather than a full rebuild.

use crate::gp::context::CallStack;
use crate::gp::primitive::Primitive;
use crate::gp::value::{ValueType, types_compatible};
use std::fmt;
use std::sync::Arc;

/// One tree element.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Label of this node, shared with every other node using the same primitive.
    pub primitive: Arc<Primitive>,
    /// Number of nodes in the subtree rooted here, this node included.
    pub subtree_size: usize,
}

impl Node {
    /// A node whose subtree size has not been computed yet.
    #[must_use]
    pub fn new(primitive: Arc<Primitive>) -> Self {
        Self {
            primitive,
            subtree_size: 1,
        }
    }

    /// Arity of the node's primitive.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.primitive.arity()
    }

    /// Whether the node takes arguments.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.arity() > 0
    }
}

/// Index of child `child` of node `index` in a pre-order node slice.
///
/// # Panics
///
/// Panics if `child` is not below the node's arity.
#[must_use]
pub fn child_index_in(nodes: &[Node], index: usize, child: usize) -> usize {
    let arity = nodes[index].arity();
    assert!(
        child < arity,
        "child {child} requested from node {index} of arity {arity}"
    );
    let mut position = index + 1;
    for _ in 0..child {
        position += nodes[position].subtree_size;
    }
    position
}

/// Depth of the subtree rooted at `index`; a leaf has depth 1.
#[must_use]
pub fn depth_in(nodes: &[Node], index: usize) -> usize {
    let mut deepest = 0;
    let mut child = index + 1;
    for _ in 0..nodes[index].arity() {
        deepest = deepest.max(depth_in(nodes, child));
        child += nodes[child].subtree_size;
    }
    deepest + 1
}

/// Recompute every subtree size below and including `index` from arities.
///
/// # Panics
///
/// Panics if the arities describe more nodes than the slice holds.
pub fn fix_sizes_in(nodes: &mut [Node], index: usize) -> usize {
    let mut size = 1;
    for _ in 0..nodes[index].arity() {
        size += fix_sizes_in(nodes, index + size);
    }
    nodes[index].subtree_size = size;
    size
}

/// Like [`fix_sizes_in`], but reports truncation instead of panicking.
fn try_fix_sizes_in(nodes: &mut [Node], index: usize) -> Result<usize, StructureError> {
    if index >= nodes.len() {
        return Err(StructureError::Truncated { index });
    }
    let mut size = 1;
    for _ in 0..nodes[index].arity() {
        size += try_fix_sizes_in(nodes, index + size)?;
    }
    nodes[index].subtree_size = size;
    Ok(size)
}

/// Violations of the tree invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureError {
    /// The tree has no nodes.
    Empty,
    /// A node's arity runs past the end of the node sequence.
    Truncated {
        /// First missing index.
        index: usize,
    },
    /// Nodes follow the root's subtree.
    TrailingNodes {
        /// Size implied by the arities.
        expected: usize,
        /// Actual number of nodes.
        actual: usize,
    },
    /// A recorded subtree size disagrees with the arities.
    SizeMismatch {
        /// Offending node.
        index: usize,
        /// Size stored on the node.
        recorded: usize,
        /// Size implied by the arities.
        computed: usize,
    },
    /// A node's return type does not fit the slot it occupies.
    TypeMismatch {
        /// Offending node.
        index: usize,
        /// Type the slot requires.
        expected: ValueType,
        /// Type the node returns.
        found: ValueType,
    },
    /// An argument reference points past the tree's parameter list.
    ArgumentOutOfRange {
        /// Offending node.
        index: usize,
        /// Referenced parameter.
        argument: usize,
        /// Parameters the tree takes.
        number_arguments: usize,
    },
    /// A generator placeholder was never resolved.
    Unresolved {
        /// Offending node.
        index: usize,
    },
    /// The tree is deeper than allowed.
    DepthExceeded {
        /// Actual depth.
        depth: usize,
        /// Allowed depth.
        max_depth: usize,
    },
    /// An invoker targets a tree it may not call.
    InvalidInvocation {
        /// Offending node.
        index: usize,
        /// Target tree index.
        target: usize,
    },
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureError::Empty => write!(f, "tree is empty"),
            StructureError::Truncated { index } => {
                write!(f, "node sequence ends before index {index}")
            }
            StructureError::TrailingNodes { expected, actual } => {
                write!(f, "root spans {expected} nodes but the tree holds {actual}")
            }
            StructureError::SizeMismatch {
                index,
                recorded,
                computed,
            } => write!(
                f,
                "node {index} records subtree size {recorded}, arities imply {computed}"
            ),
            StructureError::TypeMismatch {
                index,
                expected,
                found,
            } => write!(f, "node {index} returns {found} where {expected} is required"),
            StructureError::ArgumentOutOfRange {
                index,
                argument,
                number_arguments,
            } => write!(
                f,
                "node {index} references argument {argument} of a tree taking {number_arguments}"
            ),
            StructureError::Unresolved { index } => {
                write!(f, "node {index} holds an unresolved generator")
            }
            StructureError::DepthExceeded { depth, max_depth } => {
                write!(f, "tree depth {depth} exceeds maximum {max_depth}")
            }
            StructureError::InvalidInvocation { index, target } => {
                write!(f, "node {index} invokes tree {target}, which it may not call")
            }
        }
    }
}

impl std::error::Error for StructureError {}

/// Iterator over the indices of a node's children.
#[derive(Debug, Clone)]
pub struct Children<'t> {
    nodes: &'t [Node],
    next: usize,
    remaining: usize,
}

impl Iterator for Children<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let child = self.next;
        self.next += self.nodes[child].subtree_size;
        self.remaining -= 1;
        Some(child)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// A genotype tree in linear pre-order storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    number_arguments: usize,
    primitive_set_index: usize,
    root_type: Option<ValueType>,
}

impl Tree {
    /// Create an empty tree drawing from primitive set `primitive_set_index`.
    #[must_use]
    pub fn new(primitive_set_index: usize, number_arguments: usize) -> Self {
        Self {
            nodes: Vec::new(),
            number_arguments,
            primitive_set_index,
            root_type: None,
        }
    }

    /// Require the root to return `root_type`.
    #[must_use]
    pub fn with_root_type(mut self, root_type: Option<ValueType>) -> Self {
        self.root_type = root_type;
        self
    }

    /// Build a tree from primitives listed in pre-order, computing subtree sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if the arities do not describe exactly the given sequence.
    pub fn from_preorder(
        primitives: Vec<Arc<Primitive>>,
        primitive_set_index: usize,
        number_arguments: usize,
    ) -> Result<Self, StructureError> {
        let mut tree = Self::new(primitive_set_index, number_arguments);
        tree.nodes = primitives.into_iter().map(Node::new).collect();
        if tree.nodes.is_empty() {
            return Err(StructureError::Empty);
        }
        let size = try_fix_sizes_in(&mut tree.nodes, 0)?;
        if size != tree.nodes.len() {
            return Err(StructureError::TrailingNodes {
                expected: size,
                actual: tree.nodes.len(),
            });
        }
        Ok(tree)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in pre-order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Formal parameter count when this tree is invoked.
    #[must_use]
    pub fn number_arguments(&self) -> usize {
        self.number_arguments
    }

    /// Change the formal parameter count.
    pub fn set_number_arguments(&mut self, number_arguments: usize) {
        self.number_arguments = number_arguments;
    }

    /// Primitive set the tree draws from.
    #[must_use]
    pub fn primitive_set_index(&self) -> usize {
        self.primitive_set_index
    }

    /// Required root return type.
    #[must_use]
    pub fn root_type(&self) -> Option<ValueType> {
        self.root_type
    }

    /// Replace the whole node sequence.
    pub fn set_nodes(&mut self, nodes: Vec<Node>) {
        self.nodes = nodes;
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Nodes of the subtree rooted at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn subtree(&self, index: usize) -> &[Node] {
        &self.nodes[index..index + self.nodes[index].subtree_size]
    }

    /// Whether `descendant` lies in the subtree rooted at `ancestor` (itself included).
    #[must_use]
    pub fn contains(&self, ancestor: usize, descendant: usize) -> bool {
        descendant >= ancestor && descendant < ancestor + self.nodes[ancestor].subtree_size
    }

    /// Indices of the children of node `index`, in argument order.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn children(&self, index: usize) -> Children<'_> {
        Children {
            nodes: &self.nodes,
            next: index + 1,
            remaining: self.nodes[index].arity(),
        }
    }

    /// Index of child `child` of node `index`.
    ///
    /// # Panics
    ///
    /// Panics if `child` is not below the node's arity.
    #[must_use]
    pub fn child_index(&self, index: usize, child: usize) -> usize {
        child_index_in(&self.nodes, index, child)
    }

    /// Argument position `child` occupies under `parent`, if it is a direct child.
    #[must_use]
    pub fn child_position(&self, parent: usize, child: usize) -> Option<usize> {
        self.children(parent).position(|c| c == child)
    }

    /// Depth of the whole tree; 0 when empty.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            0
        } else {
            depth_in(&self.nodes, 0)
        }
    }

    /// Depth of the subtree rooted at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn depth_at(&self, index: usize) -> usize {
        depth_in(&self.nodes, index)
    }

    /// Number of nodes with at least one argument.
    #[must_use]
    pub fn branch_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_branch()).count()
    }

    /// Ancestor chain from the root down to `index`, ending with `index` itself.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the subtree sizes are inconsistent.
    #[must_use]
    pub fn path_to_node(&self, index: usize) -> CallStack {
        assert!(
            index < self.nodes.len(),
            "node {index} out of range for tree of size {}",
            self.nodes.len()
        );
        let mut stack = CallStack::with_capacity(8);
        let mut current = 0;
        stack.push(current);
        while current != index {
            let next = self
                .children(current)
                .find(|&c| index < c + self.nodes[c].subtree_size);
            match next {
                Some(child) => {
                    stack.push(child);
                    current = child;
                }
                None => panic!("node {index} is not reachable from node {current}"),
            }
        }
        stack
    }

    /// Type required of whatever sits on top of `stack`.
    ///
    /// The root must return the tree's root type; any other node must return
    /// the type of the argument slot it fills in its parent.
    ///
    /// # Panics
    ///
    /// Panics if `stack` does not describe a parent/child chain of this tree.
    #[must_use]
    pub fn slot_type(&self, stack: &CallStack) -> Option<ValueType> {
        let Some(child) = stack.top() else {
            return self.root_type;
        };
        match stack.parent() {
            None => self.root_type,
            Some(parent) => match self.child_position(parent, child) {
                Some(position) => self.nodes[parent].primitive.arg_type(position),
                None => panic!("node {child} is not a child of node {parent}"),
            },
        }
    }

    /// Recompute every subtree size in the subtree rooted at `index`.
    ///
    /// Returns the recomputed size of that subtree.
    ///
    /// # Panics
    ///
    /// Panics if the arities describe more nodes than the tree holds.
    pub fn fix_subtree_size(&mut self, index: usize) -> usize {
        fix_sizes_in(&mut self.nodes, index)
    }

    /// Replace the subtree on top of `stack` with `replacement`.
    ///
    /// `stack` must be the path to the replaced node (see
    /// [`Tree::path_to_node`]); the size difference is propagated to each
    /// recorded ancestor. Returns the nodes that were removed.
    ///
    /// # Panics
    ///
    /// Panics if `stack` is empty.
    pub fn replace_subtree(&mut self, stack: &CallStack, replacement: &[Node]) -> Vec<Node> {
        let Some(index) = stack.top() else {
            panic!("replace_subtree requires a non-empty call stack");
        };
        let old_size = self.nodes[index].subtree_size;
        let new_size = replacement.len();
        let removed: Vec<Node> = self
            .nodes
            .splice(index..index + old_size, replacement.iter().cloned())
            .collect();
        for &ancestor in stack.ancestors() {
            let node = &mut self.nodes[ancestor];
            node.subtree_size = node.subtree_size - old_size + new_size;
        }
        removed
    }

    /// Swap the primitive of node `index` for one of identical arity.
    ///
    /// # Panics
    ///
    /// Panics if the arities differ.
    pub fn set_primitive(&mut self, index: usize, primitive: Arc<Primitive>) {
        let node = &mut self.nodes[index];
        assert_eq!(
            node.arity(),
            primitive.arity(),
            "primitive swap at node {index} must keep the arity"
        );
        node.primitive = primitive;
    }

    /// Check the size and argument invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), StructureError> {
        if self.nodes.is_empty() {
            return Err(StructureError::Empty);
        }
        let size = self.check_sizes(0)?;
        if size != self.nodes.len() {
            return Err(StructureError::TrailingNodes {
                expected: size,
                actual: self.nodes.len(),
            });
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if node.primitive.is_generator() {
                return Err(StructureError::Unresolved { index });
            }
            if let Primitive::Argument(arg) = node.primitive.as_ref()
                && let Some(argument) = arg.index
                && argument >= self.number_arguments
            {
                return Err(StructureError::ArgumentOutOfRange {
                    index,
                    argument,
                    number_arguments: self.number_arguments,
                });
            }
        }
        Ok(())
    }

    fn check_sizes(&self, index: usize) -> Result<usize, StructureError> {
        let Some(node) = self.nodes.get(index) else {
            return Err(StructureError::Truncated { index });
        };
        let mut size = 1;
        for _ in 0..node.arity() {
            size += self.check_sizes(index + size)?;
        }
        if node.subtree_size != size {
            return Err(StructureError::SizeMismatch {
                index,
                recorded: node.subtree_size,
                computed: size,
            });
        }
        Ok(size)
    }

    /// Check that every node returns the type its slot requires.
    ///
    /// Assumes [`Tree::validate`] passes.
    ///
    /// # Errors
    ///
    /// Returns the first mismatch found.
    pub fn validate_types(&self) -> Result<(), StructureError> {
        if let Some(root) = self.nodes.first() {
            check_type(0, self.root_type, root.primitive.return_type())?;
        }
        for (index, node) in self.nodes.iter().enumerate() {
            for (position, child) in self.children(index).enumerate() {
                check_type(
                    child,
                    node.primitive.arg_type(position),
                    self.nodes[child].primitive.return_type(),
                )?;
            }
        }
        Ok(())
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, index: usize) -> fmt::Result {
        let node = &self.nodes[index];
        write!(f, "{}", node.primitive)?;
        if node.is_branch() {
            write!(f, "(")?;
            for (position, child) in self.children(index).enumerate() {
                if position > 0 {
                    write!(f, ", ")?;
                }
                self.write_node(f, child)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

fn check_type(
    index: usize,
    required: Option<ValueType>,
    provided: Option<ValueType>,
) -> Result<(), StructureError> {
    match (required, provided) {
        (Some(expected), Some(found)) if !types_compatible(required, provided) => {
            Err(StructureError::TypeMismatch {
                index,
                expected,
                found,
            })
        }
        _ => Ok(()),
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nodes.is_empty() {
            return write!(f, "()");
        }
        self.write_node(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::primitive::Op;
    use crate::gp::value::Value;

    fn op(op: Op) -> Arc<Primitive> {
        Arc::new(Primitive::Operator(op))
    }

    fn constant(b: bool) -> Arc<Primitive> {
        Arc::new(Primitive::constant(
            if b { "TRUE" } else { "FALSE" },
            Value::Bool(b),
        ))
    }

    /// AND(NOT(TRUE), OR(FALSE, TRUE))
    fn sample() -> Tree {
        Tree::from_preorder(
            vec![
                op(Op::And),
                op(Op::Not),
                constant(true),
                op(Op::Or),
                constant(false),
                constant(true),
            ],
            0,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_from_preorder_sizes() {
        let tree = sample();
        let sizes: Vec<usize> = tree.nodes().iter().map(|n| n.subtree_size).collect();
        assert_eq!(sizes, vec![6, 2, 1, 3, 1, 1]);
        assert_eq!(tree.to_string(), "AND(NOT(TRUE), OR(FALSE, TRUE))");
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_from_preorder_rejects_bad_layout() {
        let truncated = Tree::from_preorder(vec![op(Op::And), constant(true)], 0, 0);
        assert_eq!(truncated, Err(StructureError::Truncated { index: 2 }));

        let trailing = Tree::from_preorder(vec![constant(true), constant(false)], 0, 0);
        assert_eq!(
            trailing,
            Err(StructureError::TrailingNodes {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_navigation() {
        let tree = sample();
        assert_eq!(tree.children(0).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(tree.child_index(3, 1), 5);
        assert_eq!(tree.child_position(3, 5), Some(1));
        assert_eq!(tree.child_position(0, 2), None);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.depth_at(3), 2);
        assert_eq!(tree.branch_count(), 3);
        assert!(tree.contains(3, 5));
        assert!(!tree.contains(1, 3));
    }

    #[test]
    #[should_panic(expected = "child 2 requested")]
    fn test_child_index_out_of_range_panics() {
        let _ = sample().child_index(0, 2);
    }

    #[test]
    fn test_path_to_node() {
        let tree = sample();
        assert_eq!(tree.path_to_node(0).as_slice(), &[0]);
        assert_eq!(tree.path_to_node(2).as_slice(), &[0, 1, 2]);
        assert_eq!(tree.path_to_node(5).as_slice(), &[0, 3, 5]);
    }

    #[test]
    fn test_fix_subtree_size_is_idempotent() {
        let mut tree = sample();
        let before = tree.clone();
        assert_eq!(tree.fix_subtree_size(0), 6);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_replace_subtree_propagates_delta() {
        let mut tree = sample();
        let stack = tree.path_to_node(4);
        let replacement = sample().subtree(1).to_vec();
        let removed = tree.replace_subtree(&stack, &replacement);

        assert_eq!(removed.len(), 1);
        assert_eq!(tree.to_string(), "AND(NOT(TRUE), OR(NOT(TRUE), TRUE))");
        assert_eq!(tree.node(0).subtree_size, 7);
        assert_eq!(tree.node(3).subtree_size, 4);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_validate_detects_stale_sizes() {
        let mut tree = sample();
        let mut nodes = tree.nodes().to_vec();
        nodes[3].subtree_size = 2;
        tree.set_nodes(nodes);
        assert_eq!(
            tree.validate(),
            Err(StructureError::SizeMismatch {
                index: 3,
                recorded: 2,
                computed: 3
            })
        );
        tree.fix_subtree_size(0);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_validate_argument_range() {
        let tree = Tree::from_preorder(
            vec![op(Op::And), Arc::new(Primitive::argument_at(0, None)), Arc::new(Primitive::argument_at(2, None))],
            1,
            2,
        )
        .unwrap();
        assert_eq!(
            tree.validate(),
            Err(StructureError::ArgumentOutOfRange {
                index: 2,
                argument: 2,
                number_arguments: 2
            })
        );
    }

    #[test]
    fn test_validate_types() {
        let x = Arc::new(Primitive::variable("X", 0, Some(ValueType::Float)));
        let typed = Tree::from_preorder(vec![op(Op::Lt), Arc::clone(&x), x], 0, 0)
            .unwrap()
            .with_root_type(Some(ValueType::Bool));
        assert!(typed.validate_types().is_ok());

        let wrong_root = typed.clone().with_root_type(Some(ValueType::Float));
        assert_eq!(
            wrong_root.validate_types(),
            Err(StructureError::TypeMismatch {
                index: 0,
                expected: ValueType::Float,
                found: ValueType::Bool
            })
        );

        let wrong_child = Tree::from_preorder(vec![op(Op::Not), op(Op::Neg), constant(true)], 0, 0)
            .unwrap();
        assert_eq!(
            wrong_child.validate_types(),
            Err(StructureError::TypeMismatch {
                index: 1,
                expected: ValueType::Bool,
                found: ValueType::Float
            })
        );
    }

    #[test]
    fn test_slot_type() {
        let tree = sample().with_root_type(Some(ValueType::Bool));
        assert_eq!(tree.slot_type(&tree.path_to_node(0)), Some(ValueType::Bool));
        assert_eq!(tree.slot_type(&tree.path_to_node(4)), Some(ValueType::Bool));
    }
}
