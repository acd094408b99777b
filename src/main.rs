//! Arbor CLI - evolve programs and inspect saved individuals.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Arbor - tree-based genetic programming
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evolve a solution to the even-N parity problem
    Evolve {
        /// Number of parity inputs
        #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=16))]
        bits: u32,

        /// Evolve a two-argument ADF alongside the main tree
        #[arg(long)]
        adf: bool,

        /// Population size (overrides the config file)
        #[arg(short, long)]
        population: Option<usize>,

        /// Number of generations (overrides the config file)
        #[arg(short, long)]
        generations: Option<usize>,

        /// Random seed (overrides the config file)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Evolution configuration as JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Save the best individual to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Suppress the progress bar and per-generation output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print and re-evaluate a saved individual
    Show {
        /// Individual document (.json)
        #[arg(required = true)]
        individual: PathBuf,

        /// Number of parity inputs the individual was evolved for
        #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=16))]
        bits: u32,

        /// The individual carries an ADF
        #[arg(long)]
        adf: bool,
    },
}

fn main() -> ExitCode {
    // Initialize tracing if ARBOR_LOG is set
    if let Ok(filter) = EnvFilter::try_from_env("ARBOR_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .init();
        tracing::debug!("tracing initialized");
    }

    let args = Args::parse();

    let result = match args.command {
        Commands::Evolve {
            bits,
            adf,
            population,
            generations,
            seed,
            config,
            output,
            quiet,
        } => cli::evolve::execute(&cli::evolve::EvolveArgs {
            bits,
            adf,
            population,
            generations,
            seed,
            config,
            output,
            quiet,
        }),

        Commands::Show {
            individual,
            bits,
            adf,
        } => cli::show::execute(&individual, bits, adf),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
