//! Main evolution loop for genetic programming.
//!
//! Generational scheme: evaluate, record statistics, keep the elites, then
//! fill the rest of the next population with offspring of tournament
//! winners. Each offspring pair is crossed with the configured probability
//! and each child then goes through every mutation operator.

// Evolution uses intentional casts for statistics
#![allow(clippy::cast_precision_loss)]

use crate::error::EvalError;
use crate::gp::context::{Constraints, chance};
use crate::gp::crossover::{CrossoverConfig, crossover};
use crate::gp::fitness::{FitnessConfig, Problem, evaluate_population};
use crate::gp::individual::Individual;
use crate::gp::init::{InitConfig, InitError, init_population};
use crate::gp::mutation::{MutationConfig, mutate};
use crate::gp::selection::{SelectionConfig, SelectionStats, select_elite, select_parents};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Configuration for the evolution process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Population size.
    pub population_size: usize,
    /// Number of generations to evaluate.
    pub generations: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
    /// Stop as soon as this fitness is reached; falls back to the problem's target.
    pub target_fitness: Option<f64>,
    /// Structural limits shared by every operator.
    pub constraints: Constraints,
    /// Initial population construction.
    pub init: InitConfig,
    /// Selection configuration.
    pub selection: SelectionConfig,
    /// Crossover configuration.
    pub crossover: CrossoverConfig,
    /// Mutation configuration.
    pub mutation: MutationConfig,
    /// Fitness evaluation configuration.
    pub fitness: FitnessConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 500,
            generations: 50,
            seed: 42,
            target_fitness: None,
            constraints: Constraints::default(),
            init: InitConfig::default(),
            selection: SelectionConfig::default(),
            crossover: CrossoverConfig::default(),
            mutation: MutationConfig::default(),
            fitness: FitnessConfig::default(),
        }
    }
}

impl EvolutionConfig {
    /// Reject settings no run can start from.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::EmptyPopulation`] for a zero population and
    /// [`EvolutionError::InvalidProbability`] for the first probability that
    /// is NaN or outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if self.population_size == 0 {
            return Err(EvolutionError::EmptyPopulation);
        }
        let mutation = &self.mutation;
        let probabilities = [
            ("crossover.probability", self.crossover.probability),
            (
                "crossover.distribution_probability",
                self.crossover.distribution_probability,
            ),
            ("mutation.standard.probability", mutation.standard.probability),
            ("mutation.shrink.probability", mutation.shrink.probability),
            ("mutation.swap.probability", mutation.swap.probability),
            (
                "mutation.swap.distribution_probability",
                mutation.swap.distribution_probability,
            ),
            (
                "mutation.swap_subtree.probability",
                mutation.swap_subtree.probability,
            ),
            (
                "mutation.swap_subtree.internal_probability",
                mutation.swap_subtree.internal_probability,
            ),
        ];
        if let Some((field, value)) = probabilities
            .into_iter()
            .find(|(_, value)| !(0.0..=1.0).contains(value))
        {
            return Err(EvolutionError::InvalidProbability { field, value });
        }
        Ok(())
    }
}

/// Statistics for a single generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generation number.
    pub generation: usize,
    /// Best fitness in this generation.
    pub best_fitness: f64,
    /// Mean fitness.
    pub mean_fitness: f64,
    /// Fitness standard deviation.
    pub fitness_std: f64,
    /// Mean node count per individual.
    pub mean_size: f64,
    /// Node count of the generation's best individual.
    pub best_size: usize,
}

/// Overall statistics from an evolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Statistics per generation.
    pub generations: Vec<GenerationStats>,
    /// Best fitness achieved.
    pub best_fitness: f64,
    /// Generation where best fitness was achieved.
    pub best_generation: usize,
    /// Whether the target fitness was reached.
    pub solved: bool,
    /// Total time in seconds.
    pub elapsed_seconds: f64,
}

/// Best individual found and the statistics of the run.
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    /// Fittest individual seen in any generation.
    pub best: Individual,
    /// Run statistics.
    pub stats: EvolutionStats,
}

/// Error during evolution.
#[derive(Debug)]
pub enum EvolutionError {
    /// The configuration asks for an empty population.
    EmptyPopulation,
    /// A configured probability is NaN or outside `[0, 1]`.
    InvalidProbability {
        /// Dotted path of the setting.
        field: &'static str,
        /// Value found.
        value: f64,
    },
    /// The initial population could not be built.
    Init(InitError),
    /// An evaluation failed for a reason other than a resource ceiling.
    Eval(EvalError),
}

impl std::fmt::Display for EvolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPopulation => write!(f, "population size must be positive"),
            Self::InvalidProbability { field, value } => {
                write!(f, "{field} must lie in [0, 1], got {value}")
            }
            Self::Init(e) => write!(f, "initialization failed: {e}"),
            Self::Eval(e) => write!(f, "evaluation failed: {e}"),
        }
    }
}

impl std::error::Error for EvolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EmptyPopulation | Self::InvalidProbability { .. } => None,
            Self::Init(e) => Some(e),
            Self::Eval(e) => Some(e),
        }
    }
}

impl From<InitError> for EvolutionError {
    fn from(e: InitError) -> Self {
        Self::Init(e)
    }
}

impl From<EvalError> for EvolutionError {
    fn from(e: EvalError) -> Self {
        Self::Eval(e)
    }
}

/// Run the evolution process.
///
/// # Errors
///
/// Returns an error if the configuration is rejected by
/// [`EvolutionConfig::validate`] or the population cannot be initialized or
/// evaluated.
pub fn evolve<P: Problem + ?Sized>(
    problem: &P,
    config: &EvolutionConfig,
) -> Result<EvolutionOutcome, EvolutionError> {
    evolve_with(problem, config, |_| {})
}

/// Run the evolution process, reporting each generation to `on_generation`.
///
/// The initial depth range is capped at the structural depth limit, so
/// generation 0 already respects it.
///
/// # Errors
///
/// Returns an error if the configuration is rejected by
/// [`EvolutionConfig::validate`] or the population cannot be initialized or
/// evaluated.
pub fn evolve_with<P, F>(
    problem: &P,
    config: &EvolutionConfig,
    mut on_generation: F,
) -> Result<EvolutionOutcome, EvolutionError>
where
    P: Problem + ?Sized,
    F: FnMut(&GenerationStats),
{
    config.validate()?;
    let start_time = Instant::now();
    let mut rng = SmallRng::seed_from_u64(config.seed);
    let sets = problem.primitives();
    let layout = problem.layout();
    let target = config.target_fitness.or_else(|| problem.target_fitness());

    let mut population = init_population(
        config.population_size,
        &layout,
        sets,
        &config.init.capped(config.constraints.max_depth),
        config.constraints.strong_typing,
        &mut rng,
    )?;

    let mut best: Option<Individual> = None;
    let mut best_fitness = f64::NEG_INFINITY;
    let mut best_generation = 0;
    let mut gen_stats = Vec::with_capacity(config.generations);
    let mut solved = false;

    for generation in 0..config.generations.max(1) {
        let fitness = evaluate_population(&mut population, problem, &config.fitness)?;

        let stats = SelectionStats::from_fitness(&fitness);
        let leader = select_elite(&fitness, 1)[0];
        let gen_stat = GenerationStats {
            generation,
            best_fitness: stats.best_fitness,
            mean_fitness: stats.mean_fitness,
            fitness_std: stats.fitness_std,
            mean_size: population.iter().map(Individual::size).sum::<usize>() as f64
                / population.len() as f64,
            best_size: population[leader].size(),
        };
        tracing::info!(
            generation,
            best = gen_stat.best_fitness,
            mean = gen_stat.mean_fitness,
            std = gen_stat.fitness_std,
            mean_size = gen_stat.mean_size,
            "generation evaluated"
        );
        on_generation(&gen_stat);
        gen_stats.push(gen_stat);

        if best.is_none() || fitness[leader] > best_fitness {
            best_fitness = fitness[leader];
            best = Some(population[leader].clone());
            best_generation = generation;
        }

        if target.is_some_and(|t| best_fitness >= t) {
            tracing::info!(generation, fitness = best_fitness, "target fitness reached");
            solved = true;
            break;
        }
        if generation + 1 >= config.generations {
            break;
        }

        population = breed(&population, &fitness, problem, config, &mut rng);
    }

    let best = match best {
        Some(best) => best,
        None => population.swap_remove(0),
    };
    Ok(EvolutionOutcome {
        best,
        stats: EvolutionStats {
            generations: gen_stats,
            best_fitness,
            best_generation,
            solved,
            elapsed_seconds: start_time.elapsed().as_secs_f64(),
        },
    })
}

/// Build the next generation from an evaluated one.
fn breed<P: Problem + ?Sized, R: Rng>(
    population: &[Individual],
    fitness: &[f64],
    problem: &P,
    config: &EvolutionConfig,
    rng: &mut R,
) -> Vec<Individual> {
    let sets = problem.primitives();
    let selection = select_parents(fitness, &config.selection, config.population_size, rng);

    let mut next = Vec::with_capacity(config.population_size);
    // Elites keep their cached fitness.
    for &idx in &selection.elite_indices {
        next.push(population[idx].clone());
    }

    for &(p1, p2) in &selection.parent_pairs {
        let mut child1 = population[p1].clone();
        let mut child2 = population[p2].clone();
        if chance(rng, config.crossover.probability) {
            crossover(
                &mut child1,
                &mut child2,
                &config.constraints,
                &config.crossover,
                rng,
            );
        }
        mutate(&mut child1, sets, &config.constraints, &config.mutation, rng);
        mutate(&mut child2, sets, &config.constraints, &config.mutation, rng);

        next.push(child1);
        if next.len() < config.population_size {
            next.push(child2);
        }
    }
    next.truncate(config.population_size);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::EvenParity;

    #[test]
    fn test_evolution_config_default() {
        let config = EvolutionConfig::default();
        assert!(config.population_size > 0);
        assert!(config.generations > 0);
        assert_eq!(config.constraints.max_depth, 17);
        assert_eq!(config.selection.tournament_size, 7);
    }

    #[test]
    fn test_config_json_round_trip() {
        let mut config = EvolutionConfig::default();
        config.constraints.strong_typing = true;
        config.target_fitness = Some(0.5);
        let json = serde_json::to_string(&config).unwrap();
        let back: EvolutionConfig = serde_json::from_str(&json).unwrap();
        assert!(back.constraints.strong_typing);
        assert_eq!(back.target_fitness, Some(0.5));
        assert_eq!(back.init, config.init);
    }

    #[test]
    fn test_rejects_invalid_probabilities() {
        let problem = EvenParity::new(2, false).unwrap();
        let mut config = EvolutionConfig {
            population_size: 10,
            generations: 2,
            ..EvolutionConfig::default()
        };
        config.crossover.probability = 1.5;
        assert!(matches!(
            evolve(&problem, &config),
            Err(EvolutionError::InvalidProbability {
                field: "crossover.probability",
                ..
            })
        ));

        config.crossover.probability = 0.9;
        config.mutation.swap_subtree.internal_probability = f64::NAN;
        let err = evolve(&problem, &config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "mutation.swap_subtree.internal_probability must lie in [0, 1], got NaN"
        );

        config.mutation.swap_subtree.internal_probability = 0.5;
        config.population_size = 0;
        assert!(matches!(
            evolve(&problem, &config),
            Err(EvolutionError::EmptyPopulation)
        ));
    }

    #[test]
    fn test_initial_population_respects_depth_limit() {
        let problem = EvenParity::new(3, false).unwrap();
        let mut config = EvolutionConfig {
            population_size: 200,
            generations: 1,
            ..EvolutionConfig::default()
        };
        config.constraints.max_depth = 3;
        let mut first = None;
        let outcome = evolve_with(&problem, &config, |stats| first = Some(*stats)).unwrap();
        let first = first.unwrap();
        // Binary operators only: a depth-3 tree has at most 7 nodes.
        assert!(first.mean_size <= 7.0);
        assert!(first.best_size <= 7);
        assert!(outcome.best.trees[0].depth() <= 3);
        assert!(outcome.best.validate(&config.constraints).is_ok());
    }

    #[test]
    fn test_error_display() {
        let err = EvolutionError::from(EvalError::EmptyTree);
        assert_eq!(err.to_string(), "evaluation failed: cannot interpret an empty tree");
    }
}
