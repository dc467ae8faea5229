//! A solver-independent representation of a linear optimisation problem.
//!
//! Problems are built up from columns (decision variables) and rows (constraints). Every row
//! belongs to a named group (e.g. `Bus-nodal_balance`) and has a key within that group (e.g. the
//! bus and snapshot), which is how constraints are reported and how duals are read back.
use indexmap::IndexMap;
use std::fmt;

pub mod infeasibility;
pub mod solver;
pub use solver::{
    HighsSolver, SolveError, SolveResult, SolveStatus, Solver, TerminationCondition,
};

/// A decision variable in the optimisation
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(usize);

impl Variable {
    /// The index of the column this variable refers to
    pub fn index(self) -> usize {
        self.0
    }
}

/// A column of the problem
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Descriptive name (e.g. "Generator-p[gas,2013-01-01 00:00:00]")
    pub name: String,
    /// Objective coefficient
    pub cost: f64,
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

/// A row of the problem
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The constraint group
    pub group: String,
    /// The key of the row within its group
    pub key: String,
    /// Lower bound on the row activity
    pub lower: f64,
    /// Upper bound on the row activity
    pub upper: f64,
    /// Coefficients of the row
    pub terms: Vec<(Variable, f64)>,
}

impl Row {
    /// The activity of the row for the given column values
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[var.index()])
            .sum()
    }
}

/// The sense of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSense {
    /// `lhs <= rhs`
    Le,
    /// `lhs >= rhs`
    Ge,
    /// `lhs == rhs`
    Eq,
}

impl fmt::Display for ConstraintSense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
        };
        write!(f, "{symbol}")
    }
}

impl From<crate::network::Sense> for ConstraintSense {
    fn from(sense: crate::network::Sense) -> Self {
        match sense {
            crate::network::Sense::LessEqual => Self::Le,
            crate::network::Sense::GreaterEqual => Self::Ge,
            crate::network::Sense::Equal => Self::Eq,
        }
    }
}

/// A linear combination of variables plus a constant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpression {
    terms: Vec<(Variable, f64)>,
    constant: f64,
}

impl LinearExpression {
    /// Create an empty expression
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coeff * var`
    pub fn add_term(&mut self, var: Variable, coeff: f64) {
        self.terms.push((var, coeff));
    }

    /// Add a constant
    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Add `factor * other`
    pub fn add_expression(&mut self, other: &Self, factor: f64) {
        self.terms
            .extend(other.terms.iter().map(|&(var, coeff)| (var, coeff * factor)));
        self.constant += other.constant * factor;
    }

    /// Multiply every term and the constant by `factor`
    pub fn scale(&mut self, factor: f64) {
        for (_, coeff) in &mut self.terms {
            *coeff *= factor;
        }
        self.constant *= factor;
    }

    /// Whether the expression contains no variables
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The constant part
    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// The terms, with coefficients of repeated variables summed and zero coefficients dropped
    pub fn compacted_terms(&self) -> Vec<(Variable, f64)> {
        let mut merged: IndexMap<Variable, f64> = IndexMap::new();
        for &(var, coeff) in &self.terms {
            *merged.entry(var).or_insert(0.0) += coeff;
        }
        merged.into_iter().filter(|&(_, coeff)| coeff != 0.0).collect()
    }
}

impl FromIterator<(Variable, f64)> for LinearExpression {
    fn from_iter<T: IntoIterator<Item = (Variable, f64)>>(iter: T) -> Self {
        Self {
            terms: iter.into_iter().collect(),
            constant: 0.0,
        }
    }
}

/// A linear minimisation problem
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Problem {
    columns: Vec<Column>,
    rows: Vec<Row>,
    objective_constant: f64,
}

impl Problem {
    /// Add a column and return its variable
    pub fn add_variable(&mut self, name: String, cost: f64, lower: f64, upper: f64) -> Variable {
        self.columns.push(Column {
            name,
            cost,
            lower,
            upper,
        });
        Variable(self.columns.len() - 1)
    }

    /// Add to the objective coefficient of a variable
    pub fn add_cost(&mut self, var: Variable, cost: f64) {
        self.columns[var.index()].cost += cost;
    }

    /// Add a constant to the objective
    pub fn add_objective_constant(&mut self, value: f64) {
        self.objective_constant += value;
    }

    /// The constant part of the objective
    pub fn objective_constant(&self) -> f64 {
        self.objective_constant
    }

    /// Add the constraint `lhs <sense> rhs` and return the row index.
    ///
    /// The constant of `lhs` is moved to the right-hand side.
    pub fn add_constraint(
        &mut self,
        group: &str,
        key: String,
        lhs: &LinearExpression,
        sense: ConstraintSense,
        rhs: f64,
    ) -> usize {
        let rhs = rhs - lhs.constant();
        let (lower, upper) = match sense {
            ConstraintSense::Le => (f64::NEG_INFINITY, rhs),
            ConstraintSense::Ge => (rhs, f64::INFINITY),
            ConstraintSense::Eq => (rhs, rhs),
        };
        self.rows.push(Row {
            group: group.to_string(),
            key,
            lower,
            upper,
            terms: lhs.compacted_terms(),
        });
        self.rows.len() - 1
    }

    /// The columns of the problem
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The column of a variable
    pub fn column(&self, var: Variable) -> &Column {
        &self.columns[var.index()]
    }

    /// The rows of the problem
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// The number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Iterate over the rows of a group along with their indices
    pub fn rows_in_group<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = (usize, &'a Row)> + 'a {
        self.rows
            .iter()
            .enumerate()
            .filter(move |(_, row)| row.group == group)
    }

    /// The number of rows in each group, in order of first appearance
    pub fn group_sizes(&self) -> IndexMap<&str, usize> {
        let mut sizes = IndexMap::new();
        for row in &self.rows {
            *sizes.entry(row.group.as_str()).or_insert(0) += 1;
        }
        sizes
    }

    /// Evaluate the objective for the given column values
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(column, value)| column.cost * value)
            .sum::<f64>()
            + self.objective_constant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_add_constraint_moves_constant() {
        let mut problem = Problem::default();
        let x = problem.add_variable("x".into(), 1.0, 0.0, f64::INFINITY);
        let mut lhs = LinearExpression::new();
        lhs.add_term(x, 2.0);
        lhs.add_constant(3.0);
        let row = problem.add_constraint("test", "a".into(), &lhs, ConstraintSense::Ge, 5.0);

        let row = &problem.rows()[row];
        assert_approx_eq!(f64, row.lower, 2.0);
        assert!(row.upper.is_infinite());
    }

    #[test]
    fn test_compacted_terms() {
        let mut problem = Problem::default();
        let x = problem.add_variable("x".into(), 0.0, 0.0, 1.0);
        let y = problem.add_variable("y".into(), 0.0, 0.0, 1.0);
        let expr: LinearExpression = [(x, 1.0), (y, 2.0), (x, 0.5), (y, -2.0)]
            .into_iter()
            .collect();
        assert_eq!(expr.compacted_terms(), [(x, 1.5)]);
    }

    #[test]
    fn test_group_sizes() {
        let mut problem = Problem::default();
        let x = problem.add_variable("x".into(), 0.0, 0.0, 1.0);
        let lhs: LinearExpression = [(x, 1.0)].into_iter().collect();
        problem.add_constraint("a", "1".into(), &lhs, ConstraintSense::Le, 1.0);
        problem.add_constraint("b", "1".into(), &lhs, ConstraintSense::Le, 1.0);
        problem.add_constraint("a", "2".into(), &lhs, ConstraintSense::Le, 1.0);

        let sizes = problem.group_sizes();
        assert_eq!(sizes["a"], 2);
        assert_eq!(sizes["b"], 1);
        assert_eq!(problem.rows_in_group("a").count(), 2);
    }
}
