//! Nested tagged document form of trees and individuals.
//!
//! Each node is a tag holding its primitive's registered name, the resolved
//! index of argument references and invokers, the drawn value of ephemeral
//! constants, and its children in argument order. Tree tags carry the
//! `size`, `depth`, `primitive_set_index` and `number_arguments` attributes.
//! Decoding resolves names through the tree's primitive set, so concrete
//! primitives come back as the very instances the set holds.

use crate::gp::individual::Individual;
use crate::gp::primitive::Primitive;
use crate::gp::primitive_set::{PrimitiveSet, PrimitiveSuperSet};
use crate::gp::tree::{StructureError, Tree};
use crate::gp::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One node tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    /// Registered primitive name.
    pub name: String,
    /// Resolved argument or invocation target index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Value of an ephemeral constant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Child tags in argument order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDocument>,
}

/// One tree tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    /// Node count.
    pub size: usize,
    /// Depth; a lone terminal has depth 1.
    pub depth: usize,
    /// Primitive set the names resolve against.
    pub primitive_set_index: usize,
    /// Parameters the tree takes.
    pub number_arguments: usize,
    /// Required root type, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_type: Option<ValueType>,
    /// Root node.
    pub root: NodeDocument,
}

/// An individual: its trees plus the last known fitness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualDocument {
    /// Last known fitness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness: Option<f64>,
    /// Result-producing tree first, then its ADFs.
    pub trees: Vec<TreeDocument>,
}

/// Error converting between documents and trees.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// Empty trees have no document form.
    EmptyTree,
    /// The tree names a primitive set that does not exist.
    UnknownPrimitiveSet(usize),
    /// No primitive is registered under this name.
    UnknownPrimitive {
        /// Name found in the document.
        name: String,
        /// Set that was searched.
        primitive_set_index: usize,
    },
    /// A node's child count disagrees with its primitive's arity.
    ArityMismatch {
        /// Primitive name.
        name: String,
        /// Arity of the registered primitive.
        expected: usize,
        /// Children present in the document.
        found: usize,
    },
    /// An argument or invoker generator came without an index.
    MissingIndex(String),
    /// An ephemeral generator came without a value.
    MissingValue(String),
    /// The `size` attribute disagrees with the nodes present.
    SizeMismatch {
        /// Declared size.
        recorded: usize,
        /// Nodes present.
        actual: usize,
    },
    /// The `depth` attribute disagrees with the nodes present.
    DepthMismatch {
        /// Declared depth.
        recorded: usize,
        /// Depth of the nodes present.
        actual: usize,
    },
    /// The decoded tree breaks a structural invariant.
    Structure(StructureError),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::EmptyTree => write!(f, "cannot encode an empty tree"),
            DocumentError::UnknownPrimitiveSet(index) => {
                write!(f, "unknown primitive set {index}")
            }
            DocumentError::UnknownPrimitive {
                name,
                primitive_set_index,
            } => write!(
                f,
                "no primitive named '{name}' in primitive set {primitive_set_index}"
            ),
            DocumentError::ArityMismatch {
                name,
                expected,
                found,
            } => write!(f, "'{name}' takes {expected} arguments but has {found} children"),
            DocumentError::MissingIndex(name) => write!(f, "'{name}' needs an index"),
            DocumentError::MissingValue(name) => write!(f, "'{name}' needs a value"),
            DocumentError::SizeMismatch { recorded, actual } => {
                write!(f, "tree declares size {recorded} but holds {actual} nodes")
            }
            DocumentError::DepthMismatch { recorded, actual } => {
                write!(f, "tree declares depth {recorded} but has depth {actual}")
            }
            DocumentError::Structure(e) => write!(f, "invalid tree: {e}"),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Structure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StructureError> for DocumentError {
    fn from(e: StructureError) -> Self {
        DocumentError::Structure(e)
    }
}

impl NodeDocument {
    fn encode(tree: &Tree, index: usize) -> Self {
        let primitive = &tree.node(index).primitive;
        let value = match primitive.as_ref() {
            Primitive::Ephemeral { value, .. } => *value,
            _ => None,
        };
        Self {
            name: primitive.name().to_string(),
            index: primitive.index(),
            value,
            children: tree
                .children(index)
                .map(|child| NodeDocument::encode(tree, child))
                .collect(),
        }
    }

    fn decode(
        &self,
        set: &PrimitiveSet,
        primitive_set_index: usize,
        out: &mut Vec<Arc<Primitive>>,
    ) -> Result<(), DocumentError> {
        let registered = set
            .get(&self.name)
            .ok_or_else(|| DocumentError::UnknownPrimitive {
                name: self.name.clone(),
                primitive_set_index,
            })?;
        if registered.arity() != self.children.len() {
            return Err(DocumentError::ArityMismatch {
                name: self.name.clone(),
                expected: registered.arity(),
                found: self.children.len(),
            });
        }
        out.push(self.resolve(registered)?);
        for child in &self.children {
            child.decode(set, primitive_set_index, out)?;
        }
        Ok(())
    }

    fn resolve(&self, registered: &Arc<Primitive>) -> Result<Arc<Primitive>, DocumentError> {
        if !registered.is_generator() {
            return Ok(Arc::clone(registered));
        }
        let resolved = if matches!(registered.as_ref(), Primitive::Ephemeral { .. }) {
            let value = self
                .value
                .ok_or_else(|| DocumentError::MissingValue(self.name.clone()))?;
            registered.with_value(value)
        } else {
            let index = self
                .index
                .ok_or_else(|| DocumentError::MissingIndex(self.name.clone()))?;
            registered.with_index(index)
        };
        resolved
            .map(Arc::new)
            .ok_or_else(|| DocumentError::MissingIndex(self.name.clone()))
    }
}

impl TreeDocument {
    /// Document form of `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::EmptyTree`] for a tree without nodes.
    pub fn encode(tree: &Tree) -> Result<Self, DocumentError> {
        if tree.is_empty() {
            return Err(DocumentError::EmptyTree);
        }
        Ok(Self {
            size: tree.len(),
            depth: tree.depth(),
            primitive_set_index: tree.primitive_set_index(),
            number_arguments: tree.number_arguments(),
            root_type: tree.root_type(),
            root: NodeDocument::encode(tree, 0),
        })
    }

    /// Rebuild the tree, resolving names through `sets`.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown names, child counts that disagree with
    /// arities, unresolvable generators, attribute mismatches or a tree that
    /// fails [`Tree::validate`].
    pub fn decode(&self, sets: &PrimitiveSuperSet) -> Result<Tree, DocumentError> {
        let set = sets
            .get(self.primitive_set_index)
            .ok_or(DocumentError::UnknownPrimitiveSet(self.primitive_set_index))?;
        let mut primitives = Vec::new();
        self.root
            .decode(set, self.primitive_set_index, &mut primitives)?;

        let tree = Tree::from_preorder(
            primitives,
            self.primitive_set_index,
            self.number_arguments,
        )?
        .with_root_type(self.root_type);
        if tree.len() != self.size {
            return Err(DocumentError::SizeMismatch {
                recorded: self.size,
                actual: tree.len(),
            });
        }
        if tree.depth() != self.depth {
            return Err(DocumentError::DepthMismatch {
                recorded: self.depth,
                actual: tree.depth(),
            });
        }
        tree.validate()?;
        Ok(tree)
    }
}

impl IndividualDocument {
    /// Document form of `individual`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::EmptyTree`] if any tree is empty.
    pub fn encode(individual: &Individual) -> Result<Self, DocumentError> {
        Ok(Self {
            fitness: individual.fitness,
            trees: individual
                .trees
                .iter()
                .map(TreeDocument::encode)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Rebuild the individual, keeping the recorded fitness.
    ///
    /// # Errors
    ///
    /// Returns the first tree's decoding error.
    pub fn decode(&self, sets: &PrimitiveSuperSet) -> Result<Individual, DocumentError> {
        let trees = self
            .trees
            .iter()
            .map(|doc| doc.decode(sets))
            .collect::<Result<_, _>>()?;
        let mut individual = Individual::new(trees);
        individual.fitness = self.fitness;
        Ok(individual)
    }
}
