//! Reporting the outcome of a solve.
use super::SolvedProblem;
use crate::optimisation::infeasibility::diagnose;
use crate::optimisation::{SolveError, Solver};
use anyhow::Result;
use log::{error, info, warn};

/// Log a warning for an unsuccessful solve, and fail with diagnostics if it was infeasible
pub fn report_outcome(solved: &SolvedProblem, solver: &dyn Solver) -> Result<()> {
    let result = &solved.result;
    if !result.is_ok() {
        warn!(
            "Solving status '{}' with termination condition '{}'",
            result.status, result.condition
        );
    }

    if result.condition.is_infeasible() {
        match diagnose(&solved.problem, solver) {
            Ok(report) => info!("{report}"),
            Err(err) => error!("Could not compute infeasibilities: {err:#}"),
        }
        return Err(SolveError::Infeasible.into());
    }

    Ok(())
}
