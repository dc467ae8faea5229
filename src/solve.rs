//! Solving a prepared network.
//!
//! A network is solved either once or, when it has extendable lines, with the iterative
//! transmission expansion loop in [`iterative`]. Every solve builds a fresh problem from the
//! network, applies the side constraints and writes the solution back into the network.
use crate::config::Config;
use crate::constraints::{BuildContext, ConstraintAssembler};
use crate::formulation::{build, write_back};
use crate::network::Network;
use crate::optimisation::{Problem, SolveResult, Solver};
use anyhow::{Context, Result};
use log::{debug, info};

pub mod iterative;
pub mod outcome;
pub use outcome::report_outcome;

/// Everything needed to solve a network, other than the network itself
#[derive(Debug, Clone, Copy)]
pub struct SolveContext<'a> {
    /// The run configuration
    pub config: &'a Config,
    /// The side constraints to add to every problem
    pub assembler: &'a ConstraintAssembler,
    /// The LP solver
    pub solver: &'a dyn Solver,
    /// A solved reference network, for constraints which compare against one
    pub reference: Option<&'a Network>,
}

/// A problem along with the result of solving it
#[derive(Debug, Clone)]
pub struct SolvedProblem {
    /// The problem which was solved
    pub problem: Problem,
    /// The solver's result
    pub result: SolveResult,
}

/// Build, constrain and solve the problem for a network once, writing the solution back
pub fn optimise(network: &mut Network, ctx: &SolveContext) -> Result<SolvedProblem> {
    let (mut problem, formulation) = build(network).context("Failed to build the problem")?;
    let build_ctx = BuildContext {
        network,
        variables: &formulation.variables,
        reference: ctx.reference,
    };
    ctx.assembler
        .apply(&build_ctx, &mut problem)
        .context("Failed to add side constraints")?;

    debug!(
        "Solving problem with {} variables and {} constraints",
        problem.num_columns(),
        problem.num_rows()
    );
    for (group, size) in problem.group_sizes() {
        debug!("  {group}: {size}");
    }

    let result = ctx.solver.solve(&problem)?;
    write_back(network, &result, &formulation);
    if let Some(objective) = result.objective {
        info!("Objective function: {objective}");
    }

    Ok(SolvedProblem { problem, result })
}

/// Solve a network, iterating over line impedances if it has extendable lines.
///
/// A failed solve (e.g. an infeasible problem) is reported as an error after diagnostics have
/// been logged.
pub fn solve_network(network: &mut Network, ctx: &SolveContext) -> Result<SolveResult> {
    let options = &ctx.config.solving.options;
    let mut skip_iterations = options.skip_iterations;
    if !network.has_extendable_lines() {
        skip_iterations = true;
        info!("No expandable lines found. Skipping iterative solving.");
    }

    let solved = if skip_iterations {
        optimise(network, ctx)?
    } else {
        iterative::optimise_transmission_expansion_iteratively(network, ctx)?
    };
    report_outcome(&solved, ctx.solver)?;

    Ok(solved.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{config, quiet_solver, two_bus_network};
    use crate::optimisation::{HighsSolver, SolveStatus, TerminationCondition};
    use crate::opts::ScenarioOptions;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_single_solve(
        mut two_bus_network: Network,
        mut config: Config,
        quiet_solver: HighsSolver,
    ) {
        config.solving.options.skip_iterations = false;
        config.solving.options.track_iterations = true;
        let assembler =
            ConstraintAssembler::from_config(&config, &ScenarioOptions::default()).unwrap();
        let ctx = SolveContext {
            config: &config,
            assembler: &assembler,
            solver: &quiet_solver,
            reference: None,
        };
        let result = solve_network(&mut two_bus_network, &ctx).unwrap();
        assert_eq!(result.status, SolveStatus::Ok);
        assert_eq!(result.condition, TerminationCondition::Optimal);
        assert_approx_eq!(
            f64,
            two_bus_network.generators["gas"].p_nom_opt.unwrap(),
            50.0,
            epsilon = 1e-6
        );
        // No extendable lines, so nothing iterated and line parameters are untouched
        assert!(two_bus_network.iterations.is_empty());
        let line = &two_bus_network.lines["line0"];
        assert_approx_eq!(f64, line.s_nom, 200.0);
        assert_approx_eq!(f64, line.x, 0.1);
    }
}
