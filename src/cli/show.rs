//! CLI command for inspecting a saved individual.

use crate::cli::CliError;
use arbor::gp::{Constraints, ExecutionLimits, Problem, load_individual};
use arbor::problem::EvenParity;
use std::path::Path;

/// Execute the show command.
pub(crate) fn execute(path: &Path, bits: u32, adf: bool) -> Result<(), CliError> {
    let problem = EvenParity::new(bits, adf)?;
    let individual = load_individual(path, problem.primitives())?;
    if individual.trees.len() != problem.layout().len() {
        return Err(CliError::new(format!(
            "individual has {} trees, even-{bits} parity{} expects {}",
            individual.trees.len(),
            if adf { " with ADF" } else { "" },
            problem.layout().len()
        )));
    }
    individual
        .validate(&Constraints::default())
        .map_err(|e| CliError::new(e.to_string()))?;

    for (index, tree) in individual.trees.iter().enumerate() {
        println!(
            "tree {index} (size {}, depth {}): {tree}",
            tree.len(),
            tree.depth()
        );
    }
    if let Some(recorded) = individual.fitness {
        println!("Recorded fitness: {recorded:.4}");
    }

    let correct = problem.correct_cases(&individual, &ExecutionLimits::default())?;
    println!(
        "Re-evaluated: {correct}/{} cases correct ({:.4})",
        problem.cases(),
        problem.evaluate(&individual, &ExecutionLimits::default())?
    );
    Ok(())
}
