//! Tournament selection and elitism.
//!
//! Fitness is maximised. A NaN score marks an individual whose evaluation
//! produced nothing usable; it loses to every number and ties with other NaNs.

// Selection uses intentional casts for statistics
#![allow(clippy::cast_precision_loss)]

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Tournament and elitism parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Contestants drawn, with replacement, per tournament.
    pub tournament_size: usize,
    /// Fittest individuals copied into the next generation untouched.
    pub elite_count: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            tournament_size: 7,
            elite_count: 1,
        }
    }
}

/// Survivors and breeding pairs for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// Survivors, fittest first.
    pub elite_indices: Vec<usize>,
    /// Tournament winners paired up; each pair yields two children.
    pub parent_pairs: Vec<(usize, usize)>,
}

/// Total order on fitness with NaN at the bottom.
fn fitter(a: f64, b: f64) -> Ordering {
    if a.is_nan() || b.is_nan() {
        return b.is_nan().cmp(&a.is_nan());
    }
    a.total_cmp(&b)
}

/// Pick the elites and enough tournament-winner pairs to bring the next
/// generation up to `target_size`.
#[must_use]
pub fn select_parents<R: Rng>(
    fitness: &[f64],
    config: &SelectionConfig,
    target_size: usize,
    rng: &mut R,
) -> SelectionResult {
    let elites = config.elite_count.min(fitness.len()).min(target_size);
    let children = target_size - elites;

    let mut parent_pairs = Vec::new();
    if !fitness.is_empty() {
        parent_pairs.reserve(children.div_ceil(2));
        while parent_pairs.len() * 2 < children {
            let mother = tournament_select(fitness, config.tournament_size, rng);
            let father = tournament_select(fitness, config.tournament_size, rng);
            parent_pairs.push((mother, father));
        }
    }

    SelectionResult {
        elite_indices: select_elite(fitness, elites),
        parent_pairs,
    }
}

/// Indices of the `count` fittest individuals, best first.
///
/// Equal scores keep population order.
#[must_use]
pub fn select_elite(fitness: &[f64], count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fitness.len()).collect();
    order.sort_by(|&a, &b| fitter(fitness[b], fitness[a]));
    order.truncate(count);
    order
}

/// Draw `k` contestants uniformly with replacement and return the winner.
///
/// A `k` of zero runs a one-contestant tournament.
///
/// # Panics
///
/// Panics if `fitness` is empty.
pub fn tournament_select<R: Rng>(fitness: &[f64], k: usize, rng: &mut R) -> usize {
    assert!(!fitness.is_empty(), "tournament over an empty population");

    let mut winner = rng.gen_range(0..fitness.len());
    for _ in 1..k.max(1) {
        let challenger = rng.gen_range(0..fitness.len());
        if fitter(fitness[challenger], fitness[winner]).is_gt() {
            winner = challenger;
        }
    }
    winner
}

/// Fitness distribution of one population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionStats {
    /// Mean fitness of the population.
    pub mean_fitness: f64,
    /// Best fitness in the population.
    pub best_fitness: f64,
    /// Worst fitness in the population.
    pub worst_fitness: f64,
    /// Standard deviation of fitness.
    pub fitness_std: f64,
}

impl SelectionStats {
    /// Summarise the scored individuals; NaNs are skipped and an unscored
    /// population reports zeros.
    #[must_use]
    pub fn from_fitness(fitness: &[f64]) -> Self {
        let mut n = 0usize;
        let (mut mean, mut m2) = (0.0, 0.0);
        let (mut best, mut worst) = (f64::NEG_INFINITY, f64::INFINITY);
        for &f in fitness.iter().filter(|f| !f.is_nan()) {
            n += 1;
            let delta = f - mean;
            mean += delta / n as f64;
            m2 += delta * (f - mean);
            best = best.max(f);
            worst = worst.min(f);
        }
        if n == 0 {
            return Self::default();
        }

        Self {
            mean_fitness: mean,
            best_fitness: best,
            worst_fitness: worst,
            fitness_std: (m2 / n as f64).sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_tournament_favours_the_fittest() {
        let mut rng = SmallRng::seed_from_u64(42);
        let fitness = [0.1, 0.5, 0.9, 0.2, 0.8];

        let mut wins = [0usize; 5];
        for _ in 0..1000 {
            wins[tournament_select(&fitness, 3, &mut rng)] += 1;
        }
        let favourite = (0..5).max_by_key(|&i| wins[i]).unwrap();
        assert_eq!(favourite, 2);
        assert!(wins[2] > wins[4] && wins[4] > wins[1]);
    }

    #[test]
    fn test_tournament_ranks_nan_last() {
        let mut rng = SmallRng::seed_from_u64(1);
        let fitness = [f64::NAN, 0.0];
        let numeric_wins = (0..100)
            .filter(|_| tournament_select(&fitness, 8, &mut rng) == 1)
            .count();
        assert!(numeric_wins > 90);
        assert_eq!(select_elite(&fitness, 1), vec![1]);
        assert_eq!(fitter(f64::NAN, f64::NAN), Ordering::Equal);
        assert_eq!(fitter(f64::NAN, f64::NEG_INFINITY), Ordering::Less);
    }

    #[test]
    fn test_elites_best_first_with_stable_ties() {
        let fitness = [0.3, 0.9, 0.1, 0.9, 0.5];
        assert_eq!(select_elite(&fitness, 3), vec![1, 3, 4]);
        assert!(select_elite(&fitness, 0).is_empty());
    }

    #[test]
    fn test_select_parents_fills_target() {
        let mut rng = SmallRng::seed_from_u64(123);
        let fitness: Vec<f64> = (1..=10).map(|i| f64::from(i) / 10.0).collect();
        let config = SelectionConfig {
            tournament_size: 3,
            elite_count: 2,
        };

        let odd = select_parents(&fitness, &config, 11, &mut rng);
        assert_eq!(odd.elite_indices, vec![9, 8]);
        assert_eq!(odd.parent_pairs.len(), 5);

        let even = select_parents(&fitness, &config, 12, &mut rng);
        assert_eq!(even.parent_pairs.len(), 5);

        let empty = select_parents(&[], &config, 4, &mut rng);
        assert!(empty.elite_indices.is_empty() && empty.parent_pairs.is_empty());
    }

    #[test]
    fn test_selection_stats_skip_nan() {
        let stats = SelectionStats::from_fitness(&[1.0, 2.0, f64::NAN, 3.0, 4.0, 5.0]);

        assert!((stats.mean_fitness - 3.0).abs() < 1e-9);
        assert!((stats.best_fitness - 5.0).abs() < 1e-9);
        assert!((stats.worst_fitness - 1.0).abs() < 1e-9);
        assert!((stats.fitness_std - 2.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(
            SelectionStats::from_fitness(&[f64::NAN]),
            SelectionStats::default()
        );
    }
}
