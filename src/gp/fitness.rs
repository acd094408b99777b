//! Fitness evaluation for genetic programming.
//!
//! A [`Problem`] supplies the primitive sets, the tree layout of its
//! individuals and a fitness function. Populations are scored in parallel;
//! each worker interprets its own individual with its own execution context.

use crate::error::{EvalError, EvalResult};
use crate::gp::individual::{Individual, TreeLayout};
use crate::gp::interpret::ExecutionLimits;
use crate::gp::primitive_set::PrimitiveSuperSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A task evolved programs are scored on. Higher fitness is better.
pub trait Problem: Sync {
    /// Primitive sets, indexed by each tree's primitive set index.
    fn primitives(&self) -> &PrimitiveSuperSet;

    /// Shape of every individual: tree 0 first, then its ADFs.
    fn layout(&self) -> Vec<TreeLayout>;

    /// Score one individual.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::ResourceExceeded`] when interpretation crosses a
    /// ceiling in `limits`, or any other error on a wiring fault.
    fn evaluate(&self, individual: &Individual, limits: &ExecutionLimits) -> EvalResult<f64>;

    /// Fitness at which the problem counts as solved.
    fn target_fitness(&self) -> Option<f64> {
        None
    }
}

/// Configuration for fitness evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitnessConfig {
    /// Ceilings applied to each individual's evaluation.
    pub limits: ExecutionLimits,
    /// Fitness assigned when an evaluation crosses a ceiling.
    pub penalty: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            limits: ExecutionLimits {
                max_nodes: Some(1_000_000),
                ..ExecutionLimits::default()
            },
            penalty: 0.0,
        }
    }
}

/// Evaluate one individual, mapping resource breaches to the penalty.
///
/// # Errors
///
/// Returns an error for any evaluation failure other than a resource breach.
pub fn evaluate_individual<P: Problem + ?Sized>(
    individual: &Individual,
    problem: &P,
    config: &FitnessConfig,
) -> Result<f64, EvalError> {
    match problem.evaluate(individual, &config.limits) {
        Ok(fitness) if fitness.is_nan() => Ok(config.penalty),
        Ok(fitness) => Ok(fitness),
        Err(EvalError::ResourceExceeded(kind)) => {
            tracing::debug!(%kind, size = individual.size(), "evaluation aborted");
            Ok(config.penalty)
        }
        Err(e) => Err(e),
    }
}

/// Evaluate every individual without a cached fitness, in parallel.
///
/// Fitness values are stored on the individuals and returned in population
/// order.
///
/// # Errors
///
/// Returns the first non-resource evaluation error.
pub fn evaluate_population<P: Problem + ?Sized>(
    population: &mut [Individual],
    problem: &P,
    config: &FitnessConfig,
) -> Result<Vec<f64>, EvalError> {
    population
        .par_iter_mut()
        .map(|individual| {
            let fitness = match individual.fitness {
                Some(fitness) => fitness,
                None => evaluate_individual(individual, problem, config)?,
            };
            individual.fitness = Some(fitness);
            Ok(fitness)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::interpret::ExecContext;
    use crate::gp::primitive::{Op, Primitive};
    use crate::gp::primitive_set::PrimitiveSet;
    use crate::gp::tree::Tree;
    use crate::gp::value::Value;
    use std::sync::Arc;

    /// Scores an individual by the float its tree returns.
    struct Identity {
        sets: PrimitiveSuperSet,
    }

    impl Identity {
        fn new() -> Self {
            let mut set = PrimitiveSet::new();
            set.insert(Primitive::Operator(Op::Add), 1.0).unwrap();
            set.insert(Primitive::constant("ONE", Value::Float(1.0)), 1.0)
                .unwrap();
            set.insert(Primitive::variable("X", 0, None), 1.0).unwrap();
            Self {
                sets: PrimitiveSuperSet::from(vec![set]),
            }
        }

        fn individual(&self, names: &[&str]) -> Individual {
            let set = self.sets.set(0);
            let primitives = names.iter().map(|n| Arc::clone(set.get(n).unwrap())).collect();
            Individual::new(vec![Tree::from_preorder(primitives, 0, 0).unwrap()])
        }
    }

    impl Problem for Identity {
        fn primitives(&self) -> &PrimitiveSuperSet {
            &self.sets
        }

        fn layout(&self) -> Vec<TreeLayout> {
            vec![TreeLayout {
                primitive_set_index: 0,
                number_arguments: 0,
            }]
        }

        fn evaluate(&self, individual: &Individual, limits: &ExecutionLimits) -> EvalResult<f64> {
            let mut context = ExecContext::new(individual, *limits);
            Ok(context.run()?.as_float())
        }
    }

    #[test]
    fn test_resource_breach_gets_penalty() {
        let problem = Identity::new();
        let ind = problem.individual(&["+", "ONE", "+", "ONE", "ONE"]);
        let config = FitnessConfig {
            limits: ExecutionLimits {
                max_nodes: Some(3),
                ..ExecutionLimits::default()
            },
            penalty: -1.0,
        };
        assert_eq!(evaluate_individual(&ind, &problem, &config), Ok(-1.0));
        assert_eq!(
            evaluate_individual(&ind, &problem, &FitnessConfig::default()),
            Ok(3.0)
        );
    }

    #[test]
    fn test_wiring_errors_propagate() {
        let problem = Identity::new();
        // X reads input slot 0, which this problem never binds.
        let ind = problem.individual(&["X"]);
        assert_eq!(
            evaluate_individual(&ind, &problem, &FitnessConfig::default()),
            Err(EvalError::UnboundInput(0))
        );
    }

    #[test]
    fn test_population_uses_cached_fitness() {
        let problem = Identity::new();
        let mut population = vec![
            problem.individual(&["ONE"]),
            problem.individual(&["+", "ONE", "ONE"]),
        ];
        population[0].fitness = Some(10.0);
        let fitness =
            evaluate_population(&mut population, &problem, &FitnessConfig::default()).unwrap();
        assert_eq!(fitness, vec![10.0, 2.0]);
        assert_eq!(population[1].fitness, Some(2.0));
    }
}
