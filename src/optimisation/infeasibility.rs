//! Locating the constraints responsible for an infeasible problem.
//!
//! The problem is re-solved with an elastic slack on every finite side of every row and an
//! objective of minimising total slack. Rows whose slack stays positive are the ones which cannot
//! be satisfied together.
use super::{Column, Problem, Row, Solver};
use anyhow::{Result, ensure};
use std::fmt;

/// Slack below this value is treated as zero
const SLACK_TOLERANCE: f64 = 1e-6;

/// A row which had to be relaxed to restore feasibility
#[derive(Debug, Clone, PartialEq)]
pub struct RowViolation {
    /// The constraint group
    pub group: String,
    /// The key of the row within its group
    pub key: String,
    /// The amount of relaxation required
    pub violation: f64,
}

/// The result of an infeasibility analysis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfeasibilityReport {
    /// Rows which had to be relaxed, largest violation first
    pub violations: Vec<RowViolation>,
    /// Names of columns whose lower bound exceeds their upper bound
    pub inconsistent_bounds: Vec<String>,
}

impl InfeasibilityReport {
    /// Whether the analysis found anything to report
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty() && self.inconsistent_bounds.is_empty()
    }
}

impl fmt::Display for InfeasibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No conflicting constraints were identified");
        }

        writeln!(f, "Infeasibility report:")?;
        for name in &self.inconsistent_bounds {
            writeln!(f, "  variable {name}: lower bound exceeds upper bound")?;
        }
        for violation in &self.violations {
            writeln!(
                f,
                "  {}[{}]: violated by {}",
                violation.group, violation.key, violation.violation
            )?;
        }
        Ok(())
    }
}

/// Build the elastic version of `problem`.
///
/// Returns the relaxed problem along with, for each original row, the slack columns added to it.
fn elastic_problem(problem: &Problem) -> (Problem, Vec<Vec<usize>>) {
    let mut columns: Vec<Column> = problem
        .columns
        .iter()
        .map(|column| Column {
            name: column.name.clone(),
            cost: 0.0,
            lower: column.lower.min(column.upper),
            upper: column.upper.max(column.lower),
        })
        .collect();

    let mut rows = Vec::with_capacity(problem.rows.len());
    let mut slacks = Vec::with_capacity(problem.rows.len());
    for row in &problem.rows {
        let mut terms = row.terms.clone();
        let mut row_slacks = Vec::new();
        for (finite, coeff, side) in [
            (row.lower.is_finite(), 1.0, "lower"),
            (row.upper.is_finite(), -1.0, "upper"),
        ] {
            if !finite {
                continue;
            }
            columns.push(Column {
                name: format!("slack-{side}[{},{}]", row.group, row.key),
                cost: 1.0,
                lower: 0.0,
                upper: f64::INFINITY,
            });
            let index = columns.len() - 1;
            terms.push((super::Variable(index), coeff));
            row_slacks.push(index);
        }
        rows.push(Row {
            terms,
            ..row.clone()
        });
        slacks.push(row_slacks);
    }

    let elastic = Problem {
        columns,
        rows,
        objective_constant: 0.0,
    };
    (elastic, slacks)
}

/// Identify the constraints of `problem` which cannot be satisfied together
pub fn diagnose(problem: &Problem, solver: &dyn Solver) -> Result<InfeasibilityReport> {
    let inconsistent_bounds = problem
        .columns
        .iter()
        .filter(|column| column.lower > column.upper)
        .map(|column| column.name.clone())
        .collect();

    let (elastic, slacks) = elastic_problem(problem);
    let result = solver.solve(&elastic)?;
    ensure!(
        result.has_solution(),
        "Elastic re-solve for infeasibility analysis failed ({}: {})",
        result.status,
        result.condition
    );

    let mut violations: Vec<RowViolation> = problem
        .rows
        .iter()
        .zip(&slacks)
        .filter_map(|(row, row_slacks)| {
            let violation: f64 = row_slacks.iter().map(|&i| result.columns[i]).sum();
            (violation > SLACK_TOLERANCE).then(|| RowViolation {
                group: row.group.clone(),
                key: row.key.clone(),
                violation,
            })
        })
        .collect();
    violations.sort_by(|a, b| b.violation.total_cmp(&a.violation));

    Ok(InfeasibilityReport {
        violations,
        inconsistent_bounds,
    })
}
