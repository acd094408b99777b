//! Property-based tests for tree invariants under initialization and variation.
//!
//! Every operator that reports success must leave subtree sizes consistent
//! and trees within the depth limit; under strong typing every slot must
//! still receive the type it requires.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use arbor::gp::{
    Constraints, CrossoverConfig, Individual, IndividualDocument, InitConfig, InitMethod, Op,
    Primitive, PrimitiveSet, PrimitiveSuperSet, Problem, StandardMutationConfig,
    SwapMutationConfig, SwapSubtreeConfig, Tree, TreeLayout, Value, ValueType, crossover,
    fix_sizes_in, init_individual, mutate_shrink, mutate_standard, mutate_swap,
    mutate_swap_subtree,
};
use arbor::problem::EvenParity;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Boolean and float primitives mixed in one strongly typed set.
fn mixed_sets() -> PrimitiveSuperSet {
    let bool_ty = Some(ValueType::Bool);
    let mut set = PrimitiveSet::new().with_root_type(bool_ty);
    for op in [Op::And, Op::Not, Op::If, Op::Lt, Op::Add, Op::Mul, Op::Neg] {
        set.insert(Primitive::Operator(op), 1.0).unwrap();
    }
    set.insert(Primitive::variable("X", 0, Some(ValueType::Float)), 1.0)
        .unwrap();
    set.insert(Primitive::constant("ONE", Value::Float(1.0)), 1.0)
        .unwrap();
    set.insert(Primitive::constant("TRUE", Value::Bool(true)), 1.0)
        .unwrap();
    PrimitiveSuperSet::from(vec![set])
}

const MIXED_LAYOUT: [TreeLayout; 1] = [TreeLayout {
    primitive_set_index: 0,
    number_arguments: 0,
}];

fn init_config() -> InitConfig {
    InitConfig {
        method: InitMethod::Half,
        min_depth: 2,
        max_depth: 6,
        attempts: 20,
    }
}

fn constraints(strong_typing: bool) -> Constraints {
    Constraints {
        max_depth: 8,
        attempts: 4,
        strong_typing,
    }
}

fn assert_sizes_consistent(tree: &Tree) {
    for index in 0..tree.len() {
        let children: usize = tree
            .children(index)
            .map(|c| tree.node(c).subtree_size)
            .sum();
        assert_eq!(tree.node(index).subtree_size, 1 + children, "node {index} of {tree}");
    }
    assert_eq!(tree.node(0).subtree_size, tree.len());
}

fn assert_invariants(individual: &Individual, constraints: &Constraints) {
    for tree in &individual.trees {
        assert_sizes_consistent(tree);
        assert!(tree.depth() <= constraints.max_depth, "{tree} too deep");
    }
    if let Err(e) = individual.validate(constraints) {
        panic!("{e}: {individual}");
    }
}

/// Run a random mix of every operator and check the invariants after each.
fn exercise(sets: &PrimitiveSuperSet, layout: &[TreeLayout], typed: bool, seed: u64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let constraints = constraints(typed);
    let mut a = init_individual(layout, sets, &init_config(), typed, &mut rng).unwrap();
    let mut b = init_individual(layout, sets, &init_config(), typed, &mut rng).unwrap();
    assert_invariants(&a, &constraints);
    assert_invariants(&b, &constraints);

    for step in 0..40 {
        if step % 5 == 4 {
            crossover(&mut a, &mut b, &constraints, &CrossoverConfig::default(), &mut rng);
        } else {
            let target = if step % 2 == 0 { &mut a } else { &mut b };
            match step % 5 {
                0 => {
                    mutate_standard(
                        target,
                        sets,
                        &constraints,
                        &StandardMutationConfig::default(),
                        &mut rng,
                    );
                }
                1 => {
                    mutate_shrink(target, &constraints, &mut rng);
                }
                2 => {
                    mutate_swap(target, sets, &constraints, &SwapMutationConfig::default(), &mut rng);
                }
                _ => {
                    mutate_swap_subtree(target, &constraints, &SwapSubtreeConfig::default(), &mut rng);
                }
            }
        }
        assert_invariants(&a, &constraints);
        assert_invariants(&b, &constraints);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Untyped parity individuals, with and without an ADF, stay valid.
    #[test]
    fn prop_operators_preserve_invariants(seed in any::<u64>(), adf in any::<bool>()) {
        let problem = EvenParity::new(4, adf).unwrap();
        exercise(problem.primitives(), &problem.layout(), false, seed);
    }

    /// Strongly typed mixed-type individuals stay well typed.
    #[test]
    fn prop_typed_operators_preserve_types(seed in any::<u64>()) {
        exercise(&mixed_sets(), &MIXED_LAYOUT, true, seed);
    }

    /// Recomputing sizes on a consistent tree changes nothing.
    #[test]
    fn prop_size_repair_is_idempotent(seed in any::<u64>()) {
        let problem = EvenParity::new(3, false).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let ind = init_individual(&problem.layout(), problem.primitives(), &init_config(), false, &mut rng)
            .unwrap();
        let tree = &ind.trees[0];
        let mut nodes = tree.nodes().to_vec();
        prop_assert_eq!(fix_sizes_in(&mut nodes, 0), tree.len());
        prop_assert_eq!(nodes.as_slice(), tree.nodes());
    }

    /// Crossover exchanges nodes without creating or destroying any.
    #[test]
    fn prop_crossover_conserves_nodes(seed in any::<u64>()) {
        let problem = EvenParity::new(4, true).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let layout = problem.layout();
        let mut a = init_individual(&layout, problem.primitives(), &init_config(), false, &mut rng).unwrap();
        let mut b = init_individual(&layout, problem.primitives(), &init_config(), false, &mut rng).unwrap();
        let before = a.size() + b.size();
        let unconstrained = Constraints { max_depth: 64, ..Constraints::default() };
        crossover(&mut a, &mut b, &unconstrained, &CrossoverConfig::default(), &mut rng);
        prop_assert_eq!(a.size() + b.size(), before);
    }

    /// A successful shrink strictly reduces the individual's size.
    #[test]
    fn prop_shrink_reduces_size(seed in any::<u64>()) {
        let problem = EvenParity::new(3, false).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut ind = init_individual(&problem.layout(), problem.primitives(), &init_config(), false, &mut rng)
            .unwrap();
        let before = ind.size();
        if mutate_shrink(&mut ind, &Constraints::default(), &mut rng) {
            prop_assert!(ind.size() < before);
        } else {
            prop_assert_eq!(ind.size(), before);
        }
    }

    /// A successful swap relabels exactly one node and touches nothing else.
    #[test]
    fn prop_swap_is_local(seed in any::<u64>()) {
        let problem = EvenParity::new(3, false).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut ind = init_individual(&problem.layout(), problem.primitives(), &init_config(), false, &mut rng)
            .unwrap();
        let before = ind.trees[0].clone();
        let swapped = mutate_swap(
            &mut ind,
            problem.primitives(),
            &Constraints::default(),
            &SwapMutationConfig::default(),
            &mut rng,
        );
        let after = &ind.trees[0];
        prop_assert_eq!(after.len(), before.len());
        let changed: Vec<usize> = (0..after.len())
            .filter(|&i| !Arc::ptr_eq(&after.node(i).primitive, &before.node(i).primitive))
            .collect();
        prop_assert_eq!(changed.len(), usize::from(swapped));
        for i in 0..after.len() {
            prop_assert_eq!(after.node(i).subtree_size, before.node(i).subtree_size);
            prop_assert_eq!(after.node(i).arity(), before.node(i).arity());
        }
    }

    /// Encoding and decoding reproduces names, arities and sizes.
    #[test]
    fn prop_document_round_trip(seed in any::<u64>(), adf in any::<bool>()) {
        let problem = EvenParity::new(4, adf).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let ind = init_individual(&problem.layout(), problem.primitives(), &init_config(), false, &mut rng)
            .unwrap();
        let json = serde_json::to_string(&IndividualDocument::encode(&ind).unwrap()).unwrap();
        let doc: IndividualDocument = serde_json::from_str(&json).unwrap();
        let back = doc.decode(problem.primitives()).unwrap();
        prop_assert_eq!(back.trees.len(), ind.trees.len());
        for (x, y) in back.trees.iter().zip(&ind.trees) {
            prop_assert_eq!(x.len(), y.len());
            for i in 0..x.len() {
                prop_assert_eq!(x.node(i).primitive.name(), y.node(i).primitive.name());
                prop_assert_eq!(x.node(i).primitive.index(), y.node(i).primitive.index());
                prop_assert_eq!(x.node(i).subtree_size, y.node(i).subtree_size);
            }
        }
        prop_assert_eq!(back, ind);
    }
}
