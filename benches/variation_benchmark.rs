//! Benchmarks for tree construction, variation and interpretation.

#![allow(missing_docs)] // Benchmark macros generate undocumented functions
#![allow(clippy::unwrap_used)]

use std::hint::black_box;

use arbor::gp::{
    Constraints, CrossoverConfig, EvolutionConfig, ExecutionLimits, InitConfig, MutationConfig,
    Problem, crossover, evolve, init_individual, init_population, mutate,
};
use arbor::problem::EvenParity;
use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn bench_init(c: &mut Criterion) {
    let problem = EvenParity::new(5, true).unwrap();
    let layout = problem.layout();
    let mut rng = SmallRng::seed_from_u64(1);

    c.bench_function("init_population_100", |b| {
        b.iter(|| {
            black_box(
                init_population(
                    100,
                    &layout,
                    problem.primitives(),
                    &InitConfig::default(),
                    false,
                    &mut rng,
                )
                .unwrap(),
            )
        });
    });
}

fn bench_variation(c: &mut Criterion) {
    let problem = EvenParity::new(5, true).unwrap();
    let layout = problem.layout();
    let mut rng = SmallRng::seed_from_u64(2);
    let config = InitConfig {
        min_depth: 5,
        max_depth: 8,
        ..InitConfig::default()
    };
    let a = init_individual(&layout, problem.primitives(), &config, false, &mut rng).unwrap();
    let b = init_individual(&layout, problem.primitives(), &config, false, &mut rng).unwrap();
    let constraints = Constraints::default();

    c.bench_function("crossover", |bench| {
        bench.iter(|| {
            let (mut x, mut y) = (a.clone(), b.clone());
            black_box(crossover(
                &mut x,
                &mut y,
                &constraints,
                &CrossoverConfig::default(),
                &mut rng,
            ))
        });
    });

    let mut always = MutationConfig::default();
    always.standard.probability = 1.0;
    always.shrink.probability = 1.0;
    always.swap.probability = 1.0;
    always.swap_subtree.probability = 1.0;
    c.bench_function("mutate_all_operators", |bench| {
        bench.iter(|| {
            let mut x = a.clone();
            black_box(mutate(
                &mut x,
                problem.primitives(),
                &constraints,
                &always,
                &mut rng,
            ))
        });
    });
}

fn bench_interpret(c: &mut Criterion) {
    let problem = EvenParity::new(5, true).unwrap();
    let mut rng = SmallRng::seed_from_u64(3);
    let config = InitConfig {
        min_depth: 6,
        max_depth: 6,
        ..InitConfig::default()
    };
    let ind = init_individual(&problem.layout(), problem.primitives(), &config, false, &mut rng)
        .unwrap();
    let limits = ExecutionLimits::default();

    c.bench_function("evaluate_even5_parity", |b| {
        b.iter(|| black_box(problem.evaluate(&ind, &limits).unwrap()));
    });
}

fn bench_generations(c: &mut Criterion) {
    let problem = EvenParity::new(3, false).unwrap();
    let config = EvolutionConfig {
        population_size: 100,
        generations: 5,
        target_fitness: Some(2.0),
        ..EvolutionConfig::default()
    };

    let mut group = c.benchmark_group("evolution");
    group.sample_size(10);
    group.bench_function("even3_5_generations", |b| {
        b.iter(|| black_box(evolve(&problem, &config).unwrap()));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_init,
    bench_variation,
    bench_interpret,
    bench_generations
);
criterion_main!(benches);
