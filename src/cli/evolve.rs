//! CLI command for genetic programming evolution.

use crate::cli::CliError;
use arbor::gp::{EvolutionConfig, EvolutionStats, Individual, evolve_with, save_individual};
use arbor::problem::EvenParity;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};

/// Options of the evolve command.
#[derive(Debug)]
pub(crate) struct EvolveArgs {
    pub(crate) bits: u32,
    pub(crate) adf: bool,
    pub(crate) population: Option<usize>,
    pub(crate) generations: Option<usize>,
    pub(crate) seed: Option<u64>,
    pub(crate) config: Option<PathBuf>,
    pub(crate) output: Option<PathBuf>,
    pub(crate) quiet: bool,
}

/// Execute the evolve command.
pub(crate) fn execute(args: &EvolveArgs) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EvolutionConfig::default(),
    };
    if let Some(population) = args.population {
        config.population_size = population;
    }
    if let Some(generations) = args.generations {
        config.generations = generations;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let problem = EvenParity::new(args.bits, args.adf)?;

    if !args.quiet {
        println!("Starting evolution:");
        println!("  Problem: even-{} parity{}", args.bits, if args.adf { " with ADF" } else { "" });
        println!("  Population: {}", config.population_size);
        println!("  Generations: {}", config.generations);
        println!("  Seed: {}", config.seed);
        println!();
    }

    let pb = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(config.generations as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} generations {msg}")
            .map_err(|e| CliError::new(e.to_string()))?
            .progress_chars("=>-"),
    );

    let outcome = evolve_with(&problem, &config, |stats| {
        pb.set_message(format!("best {:.4}", stats.best_fitness));
        pb.inc(1);
    })?;
    pb.finish_with_message(format!("best {:.4}", outcome.stats.best_fitness));

    if let Some(output) = &args.output {
        save_individual(&outcome.best, output)?;
    }
    if !args.quiet {
        print_results(args.output.as_deref(), &outcome.best, &outcome.stats);
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<EvolutionConfig, CliError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| CliError::new(format!("invalid config {}: {e}", path.display())))
}

fn print_results(output: Option<&Path>, best: &Individual, stats: &EvolutionStats) {
    println!();
    println!("Evolution complete!");
    println!("  Solved: {}", if stats.solved { "yes" } else { "no" });
    println!("  Best fitness: {:.4}", stats.best_fitness);
    println!("  Best generation: {}", stats.best_generation);
    println!("  Best size: {}", best.size());
    println!("  Elapsed time: {:.1}s", stats.elapsed_seconds);
    println!();
    println!("{best}");
    if let Some(output) = output {
        println!();
        println!("Saved best individual to {}", output.display());
    }
}
