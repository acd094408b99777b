//! Biased, arity-filtered primitive sampling.

use crate::gp::context::TreeScope;
use crate::gp::primitive::Primitive;
use crate::gp::value::{ValueType, types_compatible};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Arity class a draw is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArityFilter {
    /// Exactly this many arguments.
    Exact(usize),
    /// Any arity.
    Any,
    /// At least one argument.
    Branch,
    /// No arguments.
    Terminal,
}

impl ArityFilter {
    /// Whether `arity` belongs to this class.
    #[must_use]
    pub fn matches(self, arity: usize) -> bool {
        match self {
            ArityFilter::Exact(n) => arity == n,
            ArityFilter::Any => true,
            ArityFilter::Branch => arity > 0,
            ArityFilter::Terminal => arity == 0,
        }
    }
}

/// Cumulative-weight wheel over primitive indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Roulette {
    indices: Vec<usize>,
    cumulative: Vec<f64>,
}

impl Roulette {
    /// Build a wheel from `(index, weight)` pairs; `None` when the total weight is zero.
    pub fn build(entries: impl IntoIterator<Item = (usize, f64)>) -> Option<Self> {
        let mut indices = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = 0.0;
        for (index, weight) in entries {
            if weight > 0.0 {
                total += weight;
                indices.push(index);
                cumulative.push(total);
            }
        }
        if indices.is_empty() {
            None
        } else {
            Some(Self {
                indices,
                cumulative,
            })
        }
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Number of selectable entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether no entry is selectable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Draw one index proportionally to its weight.
    pub fn spin<R: Rng>(&self, rng: &mut R) -> usize {
        let point = rng.gen_range(0.0..self.total());
        let slot = self.cumulative.partition_point(|&c| c <= point);
        self.indices[slot.min(self.indices.len() - 1)]
    }
}

/// Errors raised while building a primitive set.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveSetError {
    /// Another primitive already uses this name.
    DuplicateName(String),
    /// Biases must be finite and non-negative.
    InvalidBias {
        /// Primitive name.
        name: String,
        /// Rejected bias.
        bias: f64,
    },
    /// No primitive with this name is registered.
    UnknownName(String),
}

impl fmt::Display for PrimitiveSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveSetError::DuplicateName(name) => {
                write!(f, "primitive {name} is already registered")
            }
            PrimitiveSetError::InvalidBias { name, bias } => {
                write!(f, "primitive {name} has invalid bias {bias}")
            }
            PrimitiveSetError::UnknownName(name) => write!(f, "no primitive named {name}"),
        }
    }
}

impl std::error::Error for PrimitiveSetError {}

type RouletteCache = HashMap<ArityFilter, Option<Arc<Roulette>>>;

/// The primitives a tree may be built from, each with a selection bias.
#[derive(Debug, Default)]
pub struct PrimitiveSet {
    primitives: Vec<Arc<Primitive>>,
    biases: Vec<f64>,
    root_type: Option<ValueType>,
    by_name: HashMap<String, usize>,
    cache: RwLock<RouletteCache>,
}

impl Clone for PrimitiveSet {
    fn clone(&self) -> Self {
        Self {
            primitives: self.primitives.clone(),
            biases: self.biases.clone(),
            root_type: self.root_type,
            by_name: self.by_name.clone(),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl PrimitiveSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require trees built from this set to return `root_type`.
    #[must_use]
    pub fn with_root_type(mut self, root_type: Option<ValueType>) -> Self {
        self.root_type = root_type;
        self
    }

    /// Root type required of trees built from this set.
    #[must_use]
    pub fn root_type(&self) -> Option<ValueType> {
        self.root_type
    }

    /// Register a primitive with selection bias `bias`.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate name or a negative or non-finite bias.
    pub fn insert(
        &mut self,
        primitive: Primitive,
        bias: f64,
    ) -> Result<Arc<Primitive>, PrimitiveSetError> {
        self.insert_shared(Arc::new(primitive), bias)
    }

    /// Register an already shared primitive.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate name or a negative or non-finite bias.
    pub fn insert_shared(
        &mut self,
        primitive: Arc<Primitive>,
        bias: f64,
    ) -> Result<Arc<Primitive>, PrimitiveSetError> {
        let name = primitive.name().to_string();
        if !bias.is_finite() || bias < 0.0 {
            return Err(PrimitiveSetError::InvalidBias { name, bias });
        }
        if self.by_name.contains_key(&name) {
            return Err(PrimitiveSetError::DuplicateName(name));
        }
        self.by_name.insert(name, self.primitives.len());
        self.primitives.push(Arc::clone(&primitive));
        self.biases.push(bias);
        self.cache.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(primitive)
    }

    /// Change the bias of a registered primitive.
    ///
    /// # Errors
    ///
    /// Fails if the name is unknown or the bias is invalid.
    pub fn set_bias(&mut self, name: &str, bias: f64) -> Result<(), PrimitiveSetError> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| PrimitiveSetError::UnknownName(name.to_string()))?;
        if !bias.is_finite() || bias < 0.0 {
            return Err(PrimitiveSetError::InvalidBias {
                name: name.to_string(),
                bias,
            });
        }
        self.biases[index] = bias;
        self.cache.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    /// Primitive registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Primitive>> {
        self.by_name.get(name).map(|&i| &self.primitives[i])
    }

    /// Registered primitives in insertion order.
    #[must_use]
    pub fn primitives(&self) -> &[Arc<Primitive>] {
        &self.primitives
    }

    /// Bias of the primitive at position `index`.
    #[must_use]
    pub fn bias(&self, index: usize) -> f64 {
        self.biases[index]
    }

    /// Number of registered primitives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Whether no primitive is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Draw a primitive of the requested arity class, weighted by bias and scope.
    ///
    /// The wheel for a filter is cached when every candidate's weight is
    /// independent of the scope. The result may be a generator; resolve it
    /// with [`Primitive::instantiate`].
    pub fn select<R: Rng>(
        &self,
        filter: ArityFilter,
        scope: &TreeScope,
        rng: &mut R,
    ) -> Option<Arc<Primitive>> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&filter)
        {
            return cached
                .as_ref()
                .map(|wheel| Arc::clone(&self.primitives[wheel.spin(rng)]));
        }

        let stable = self
            .primitives
            .iter()
            .filter(|p| filter.matches(p.arity()))
            .all(|p| p.is_weight_stable());
        let wheel = self.wheel(filter, scope, |_| true);
        if stable {
            self.cache
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(filter, wheel.clone().map(Arc::new));
        }
        wheel.map(|wheel| Arc::clone(&self.primitives[wheel.spin(rng)]))
    }

    /// Draw a primitive of the requested arity class returning `value_type`.
    ///
    /// `None` on either side matches anything. Never cached.
    pub fn select_with_type<R: Rng>(
        &self,
        filter: ArityFilter,
        value_type: Option<ValueType>,
        scope: &TreeScope,
        rng: &mut R,
    ) -> Option<Arc<Primitive>> {
        self.select_matching(filter, scope, rng, |p| {
            types_compatible(value_type, p.return_type())
        })
    }

    /// Draw a primitive of the requested arity class that satisfies `accept`.
    pub fn select_matching<R: Rng>(
        &self,
        filter: ArityFilter,
        scope: &TreeScope,
        rng: &mut R,
        accept: impl Fn(&Primitive) -> bool,
    ) -> Option<Arc<Primitive>> {
        self.wheel(filter, scope, accept)
            .map(|wheel| Arc::clone(&self.primitives[wheel.spin(rng)]))
    }

    fn wheel(
        &self,
        filter: ArityFilter,
        scope: &TreeScope,
        accept: impl Fn(&Primitive) -> bool,
    ) -> Option<Roulette> {
        Roulette::build(
            self.primitives
                .iter()
                .enumerate()
                .filter(|(_, p)| filter.matches(p.arity()) && accept(p))
                .map(|(i, p)| (i, p.selection_weight(self.biases[i], scope))),
        )
    }
}

/// One primitive set per tree position of an individual.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveSuperSet {
    sets: Vec<PrimitiveSet>,
}

impl PrimitiveSuperSet {
    /// Create an empty super set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a set and return its index.
    pub fn push(&mut self, set: PrimitiveSet) -> usize {
        self.sets.push(set);
        self.sets.len() - 1
    }

    /// Set at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PrimitiveSet> {
        self.sets.get(index)
    }

    /// Mutable set at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut PrimitiveSet> {
        self.sets.get_mut(index)
    }

    /// Set at `index`.
    ///
    /// # Panics
    ///
    /// Panics if no set has that index.
    #[must_use]
    pub fn set(&self, index: usize) -> &PrimitiveSet {
        &self.sets[index]
    }

    /// Number of sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether there are no sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Iterate over the sets.
    pub fn iter(&self) -> impl Iterator<Item = &PrimitiveSet> {
        self.sets.iter()
    }
}

impl From<Vec<PrimitiveSet>> for PrimitiveSuperSet {
    fn from(sets: Vec<PrimitiveSet>) -> Self {
        Self { sets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::primitive::Op;
    use crate::gp::value::Value;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn boolean_set() -> PrimitiveSet {
        let mut set = PrimitiveSet::new();
        set.insert(Primitive::Operator(Op::And), 1.0).unwrap();
        set.insert(Primitive::Operator(Op::Not), 1.0).unwrap();
        set.insert(Primitive::constant("TRUE", Value::Bool(true)), 1.0)
            .unwrap();
        set.insert(Primitive::variable("X", 0, Some(ValueType::Float)), 1.0)
            .unwrap();
        set.insert(Primitive::argument(None), 1.0).unwrap();
        set
    }

    #[test]
    fn test_duplicate_and_invalid_bias_rejected() {
        let mut set = boolean_set();
        assert_eq!(
            set.insert(Primitive::Operator(Op::And), 1.0),
            Err(PrimitiveSetError::DuplicateName("AND".to_string()))
        );
        assert!(matches!(
            set.insert(Primitive::Operator(Op::Or), -1.0),
            Err(PrimitiveSetError::InvalidBias { .. })
        ));
        assert!(set.get("NOT").is_some());
        assert!(set.get("OR").is_none());
    }

    #[test]
    fn test_select_respects_arity_filter() {
        let set = boolean_set();
        let mut rng = SmallRng::seed_from_u64(11);
        let scope = TreeScope::single(0);
        for _ in 0..200 {
            let p = set.select(ArityFilter::Branch, &scope, &mut rng).unwrap();
            assert!(p.arity() > 0);
            let p = set.select(ArityFilter::Exact(1), &scope, &mut rng).unwrap();
            assert_eq!(p.name(), "NOT");
            let p = set.select(ArityFilter::Terminal, &scope, &mut rng).unwrap();
            assert_eq!(p.arity(), 0);
            // No arguments in scope: ARG carries zero weight.
            assert_ne!(p.name(), "ARG");
        }
        assert!(set.select(ArityFilter::Exact(3), &scope, &mut rng).is_none());
    }

    #[test]
    fn test_unstable_weights_follow_scope() {
        let set = boolean_set();
        let mut rng = SmallRng::seed_from_u64(5);
        let with_args = TreeScope::single(2);
        let drew_arg = (0..200).any(|_| {
            set.select(ArityFilter::Terminal, &with_args, &mut rng)
                .is_some_and(|p| p.name() == "ARG")
        });
        assert!(drew_arg);
        let without = TreeScope::single(0);
        assert!((0..200).all(|_| {
            set.select(ArityFilter::Terminal, &without, &mut rng)
                .is_some_and(|p| p.name() != "ARG")
        }));
    }

    #[test]
    fn test_select_with_type() {
        let set = boolean_set();
        let mut rng = SmallRng::seed_from_u64(9);
        let scope = TreeScope::single(0);
        for _ in 0..100 {
            let p = set
                .select_with_type(ArityFilter::Terminal, Some(ValueType::Float), &scope, &mut rng)
                .unwrap();
            assert_eq!(p.name(), "X");
        }
        assert!(
            set.select_with_type(ArityFilter::Branch, Some(ValueType::Int), &scope, &mut rng)
                .is_none()
        );
    }

    #[test]
    fn test_zero_bias_never_drawn() {
        let mut set = boolean_set();
        set.set_bias("AND", 0.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let scope = TreeScope::single(0);
        for _ in 0..100 {
            let p = set.select(ArityFilter::Branch, &scope, &mut rng).unwrap();
            assert_eq!(p.name(), "NOT");
        }
    }

    #[test]
    fn test_roulette_proportions() {
        let wheel = Roulette::build([(0, 1.0), (1, 0.0), (2, 3.0)]).unwrap();
        assert_eq!(wheel.len(), 2);
        let mut rng = SmallRng::seed_from_u64(2);
        let mut counts = [0usize; 3];
        for _ in 0..4000 {
            counts[wheel.spin(&mut rng)] += 1;
        }
        assert_eq!(counts[1], 0);
        assert!(counts[2] > counts[0] * 2);
        assert!(Roulette::build([(0, 0.0)]).is_none());
    }
}
