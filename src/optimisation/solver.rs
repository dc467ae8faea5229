//! Solving problems with an LP solver.
use super::Problem;
use anyhow::Result;
use derive_more::Display;
use highs::{HighsModelStatus, RowProblem, Sense};
use log::debug;
use std::error::Error;
use std::fmt;

/// The coarse outcome of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SolveStatus {
    /// A solution was found
    #[display("ok")]
    Ok,
    /// The solver stopped without a proven optimum
    #[display("warning")]
    Warning,
    /// The solver failed
    #[display("error")]
    Error,
}

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TerminationCondition {
    /// A proven optimum was found
    #[display("optimal")]
    Optimal,
    /// The problem has no feasible point
    #[display("infeasible")]
    Infeasible,
    /// The solver could only establish that the problem is infeasible or unbounded
    #[display("infeasible_or_unbounded")]
    InfeasibleOrUnbounded,
    /// The objective is unbounded
    #[display("unbounded")]
    Unbounded,
    /// The time limit was reached
    #[display("time_limit")]
    TimeLimit,
    /// The iteration limit was reached
    #[display("iteration_limit")]
    IterationLimit,
    /// The solver did not say
    #[display("unknown")]
    Unknown,
    /// Any other reason
    #[display("other")]
    Other,
}

impl TerminationCondition {
    /// Whether the condition indicates infeasibility
    pub fn is_infeasible(self) -> bool {
        self.to_string().contains("infeasible")
    }
}

/// The result of solving a [`Problem`]
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    /// Coarse status
    pub status: SolveStatus,
    /// Reason for stopping
    pub condition: TerminationCondition,
    /// Objective value, if a solution is available
    pub objective: Option<f64>,
    /// Column values (empty if no solution is available)
    pub columns: Vec<f64>,
    /// Row duals (empty if no solution is available)
    pub duals: Vec<f64>,
}

impl SolveResult {
    /// Whether the solve produced a usable solution
    pub fn is_ok(&self) -> bool {
        self.status == SolveStatus::Ok
    }

    /// Whether column values are available
    pub fn has_solution(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Errors raised while solving
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The problem is infeasible
    Infeasible,
    /// A solver option has a value of an unsupported type
    UnsupportedOptionValue(String),
    /// The solver rejected the problem
    Incoherent(String),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infeasible => write!(f, "Solving status 'infeasible'"),
            Self::UnsupportedOptionValue(name) => {
                write!(f, "Solver option {name} has an unsupported value type")
            }
            Self::Incoherent(msg) => write!(f, "The solver rejected the problem: {msg}"),
        }
    }
}

impl Error for SolveError {}

/// Something that can solve a [`Problem`]
pub trait Solver: fmt::Debug {
    /// Minimise the objective of `problem`
    fn solve(&self, problem: &Problem) -> Result<SolveResult>;
}

/// Solves problems with HiGHS.
///
/// Options are passed through to HiGHS unchanged.
#[derive(Debug, Clone, Default)]
pub struct HighsSolver {
    options: toml::Table,
}

impl HighsSolver {
    /// Create a solver with the given options
    pub fn new(options: toml::Table) -> Self {
        Self { options }
    }

    fn apply_options(&self, model: &mut highs::Model) -> Result<(), SolveError> {
        for (name, value) in &self.options {
            debug!("Setting solver option {name} = {value}");
            match value {
                toml::Value::Boolean(value) => model.set_option(name.as_str(), *value),
                toml::Value::Integer(value) => {
                    let value = i32::try_from(*value)
                        .map_err(|_| SolveError::UnsupportedOptionValue(name.clone()))?;
                    model.set_option(name.as_str(), value);
                }
                toml::Value::Float(value) => model.set_option(name.as_str(), *value),
                toml::Value::String(value) => model.set_option(name.as_str(), value.as_str()),
                _ => return Err(SolveError::UnsupportedOptionValue(name.clone())),
            }
        }

        Ok(())
    }
}

/// Enable logging for the solver.
///
/// Skipped when logging is switched off (e.g. when running tests).
fn enable_highs_logging(model: &mut highs::Model) {
    if let Ok(log_level) = std::env::var("GRIDPLAN_LOG_LEVEL")
        && log_level.eq_ignore_ascii_case("off")
    {
        return;
    }

    model.set_option("log_to_console", true);
    model.set_option("output_flag", true);
}

/// Map a HiGHS model status onto a status and termination condition.
///
/// The bool says whether the solution values are meaningful.
fn classify(status: HighsModelStatus) -> (SolveStatus, TerminationCondition, bool) {
    match status {
        HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty => {
            (SolveStatus::Ok, TerminationCondition::Optimal, true)
        }
        HighsModelStatus::Infeasible => {
            (SolveStatus::Warning, TerminationCondition::Infeasible, false)
        }
        HighsModelStatus::UnboundedOrInfeasible => (
            SolveStatus::Warning,
            TerminationCondition::InfeasibleOrUnbounded,
            false,
        ),
        HighsModelStatus::Unbounded => {
            (SolveStatus::Warning, TerminationCondition::Unbounded, false)
        }
        HighsModelStatus::ReachedTimeLimit => {
            (SolveStatus::Warning, TerminationCondition::TimeLimit, true)
        }
        HighsModelStatus::ReachedIterationLimit => {
            (SolveStatus::Warning, TerminationCondition::IterationLimit, true)
        }
        HighsModelStatus::Unknown => (SolveStatus::Error, TerminationCondition::Unknown, false),
        _ => (SolveStatus::Error, TerminationCondition::Other, false),
    }
}

impl Solver for HighsSolver {
    fn solve(&self, problem: &Problem) -> Result<SolveResult> {
        let mut highs_problem = RowProblem::default();
        let cols: Vec<_> = problem
            .columns()
            .iter()
            .map(|column| highs_problem.add_column(column.cost, column.lower..=column.upper))
            .collect();
        for row in problem.rows() {
            highs_problem.add_row(
                row.lower..=row.upper,
                row.terms.iter().map(|(var, coeff)| (cols[var.index()], *coeff)),
            );
        }

        let mut model = highs_problem.optimise(Sense::Minimise);
        enable_highs_logging(&mut model);
        self.apply_options(&mut model)?;

        let solved = model
            .try_solve()
            .map_err(|status| SolveError::Incoherent(format!("{status:?}")))?;
        let (status, condition, has_solution) = classify(solved.status());
        if !has_solution {
            return Ok(SolveResult {
                status,
                condition,
                objective: None,
                columns: Vec::new(),
                duals: Vec::new(),
            });
        }

        let solution = solved.get_solution();
        let columns = solution.columns().to_vec();
        let duals = solution.dual_rows().to_vec();
        Ok(SolveResult {
            status,
            condition,
            objective: Some(problem.objective_value(&columns)),
            columns,
            duals,
        })
    }
}
