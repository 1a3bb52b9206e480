//! Mixed-integer programming capability.
//!
//! The engine builds a `MilpModel` (binary variables, linear constraints,
//! a maximisation objective) and hands it to whatever `MilpSolver` it was
//! constructed with. Nothing outside `backend` touches a solver crate.

pub mod backend;

use std::fmt;
use std::time::Duration;

pub use backend::MicroLpSolver;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Handle to a binary decision variable inside one `MilpModel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Σ coefficient × variable (+ constant).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        self.terms.push((var, coefficient));
    }

    pub fn with_term(mut self, var: VarId, coefficient: f64) -> Self {
        self.add_term(var, coefficient);
        self
    }

    /// Σ var over the given variables.
    pub fn sum(vars: impl IntoIterator<Item = VarId>) -> Self {
        let mut expr = Self::new();
        for var in vars {
            expr.add_term(var, 1.0);
        }
        expr
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Evaluate against a full assignment (indexed by `VarId`).
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessOrEqual,
    GreaterOrEqual,
    Equal,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::LessOrEqual => write!(f, "<="),
            Relation::GreaterOrEqual => write!(f, ">="),
            Relation::Equal => write!(f, "=="),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Whether an assignment satisfies this constraint (within `tolerance`).
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::LessOrEqual => lhs <= self.rhs + tolerance,
            Relation::GreaterOrEqual => lhs >= self.rhs - tolerance,
            Relation::Equal => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// A 0/1 integer program: maximise `objective` subject to `constraints`.
#[derive(Debug, Clone, Default)]
pub struct MilpModel {
    name: String,
    var_names: Vec<String>,
    constraints: Vec<LinearConstraint>,
    objective: LinearExpr,
}

impl MilpModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.var_names.push(name.into());
        VarId(self.var_names.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        expr: LinearExpr,
        relation: Relation,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            expr,
            relation,
            rhs,
        });
    }

    pub fn maximize(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_vars(&self) -> usize {
        self.var_names.len()
    }

    /// Name given to `var` at creation; used in solver diagnostics.
    pub fn var_name(&self, var: VarId) -> &str {
        self.var_names.get(var.0).map_or("<unknown>", String::as_str)
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }
}

// ---------------------------------------------------------------------------
// Solve results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal.
    Optimal,
    /// Feasible incumbent returned when the time limit hit.
    Feasible,
    Infeasible,
    /// Time limit hit with no incumbent.
    TimedOut,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::Feasible => write!(f, "feasible"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    status: SolveStatus,
    values: Vec<f64>,
    objective: f64,
}

impl SolveOutcome {
    pub fn new(status: SolveStatus, values: Vec<f64>, objective: f64) -> Self {
        Self {
            status,
            values,
            objective,
        }
    }

    pub fn infeasible() -> Self {
        Self::new(SolveStatus::Infeasible, Vec::new(), 0.0)
    }

    pub fn timed_out() -> Self {
        Self::new(SolveStatus::TimedOut, Vec::new(), 0.0)
    }

    pub fn status(&self) -> SolveStatus {
        self.status
    }

    pub fn has_solution(&self) -> bool {
        matches!(self.status, SolveStatus::Optimal | SolveStatus::Feasible)
    }

    pub fn proven_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    pub fn objective_value(&self) -> f64 {
        self.objective
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Binary readout: anything above one half counts as chosen.
    pub fn is_selected(&self, var: VarId) -> bool {
        self.values.get(var.0).is_some_and(|v| *v > 0.5)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("Solver backend error: {0}")]
    Backend(String),
}

/// Anything able to solve a `MilpModel` to optimality within a time limit.
#[cfg_attr(test, mockall::automock)]
pub trait MilpSolver: Send + Sync {
    /// Solve `model`. Infeasibility and time-outs are reported through
    /// `SolveOutcome::status`; `Err` is reserved for backend failures.
    fn solve(&self, model: &MilpModel, timeout: Duration) -> Result<SolveOutcome, SolverError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_expr_evaluate() {
        let mut model = MilpModel::new("t");
        let a = model.add_binary("a");
        let b = model.add_binary("b");
        let expr = LinearExpr::new().with_term(a, 2.0).with_term(b, -1.5);
        assert_eq!(expr.evaluate(&[1.0, 1.0]), 0.5);
        assert_eq!(expr.evaluate(&[1.0, 0.0]), 2.0);
    }

    #[test]
    fn test_constraint_satisfaction() {
        let mut model = MilpModel::new("t");
        let a = model.add_binary("a");
        let b = model.add_binary("b");
        model.add_constraint("pick_one", LinearExpr::sum([a, b]), Relation::Equal, 1.0);
        let c = &model.constraints()[0];
        assert!(c.is_satisfied(&[1.0, 0.0], 1e-6));
        assert!(!c.is_satisfied(&[1.0, 1.0], 1e-6));
    }

    #[test]
    fn test_outcome_selection_readout() {
        let outcome = SolveOutcome::new(SolveStatus::Optimal, vec![0.9999, 0.0001], 3.0);
        assert!(outcome.is_selected(VarId(0)));
        assert!(!outcome.is_selected(VarId(1)));
        assert!(!outcome.is_selected(VarId(7)));
        assert!(outcome.proven_optimal());
        assert!(!SolveOutcome::timed_out().has_solution());
    }
}
