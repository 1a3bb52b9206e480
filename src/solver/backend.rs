//! `good_lp` + `microlp` backend.
//!
//! microlp is a pure-Rust branch-and-bound solver with no native
//! dependencies. It has no time-limit hook of its own, so each solve runs
//! on a dedicated worker thread and the caller waits on a channel. A
//! worker that outlives its deadline is detached; its result is dropped.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use tracing::{debug, warn};

use super::{
    LinearExpr, MilpModel, MilpSolver, Relation, SolveOutcome, SolveStatus, SolverError,
};

/// Feasibility tolerance used when re-checking the backend's answer.
const CHECK_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLpSolver;

impl MicroLpSolver {
    pub fn new() -> Self {
        Self
    }
}

impl MilpSolver for MicroLpSolver {
    fn solve(&self, model: &MilpModel, timeout: Duration) -> Result<SolveOutcome, SolverError> {
        let owned = model.clone();
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();

        thread::Builder::new()
            .name(format!("milp-{}", model.name()))
            .spawn(move || {
                // Receiver may be gone after a timeout.
                let _ = tx.send(solve_blocking(&owned));
            })
            .map_err(|e| SolverError::Backend(format!("failed to spawn solver thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => {
                debug!(
                    model = model.name(),
                    vars = model.num_vars(),
                    constraints = model.constraints().len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "MILP solved"
                );
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    model = model.name(),
                    timeout_secs = timeout.as_secs_f64(),
                    "MILP solve hit the time limit with no incumbent"
                );
                Ok(SolveOutcome::timed_out())
            }
            Err(RecvTimeoutError::Disconnected) => Err(SolverError::Backend(
                "solver thread exited without a result".to_string(),
            )),
        }
    }
}

/// Translate the model into good_lp, solve, and read back every variable.
fn solve_blocking(model: &MilpModel) -> Result<SolveOutcome, SolverError> {
    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = (0..model.num_vars())
        .map(|_| vars.add(variable().binary()))
        .collect();

    let objective = to_expression(model.objective(), &handles);
    let mut problem = vars.maximise(objective).using(microlp);

    for c in model.constraints() {
        let lhs = to_expression(&c.expr, &handles);
        let rhs = c.rhs;
        problem = match c.relation {
            Relation::LessOrEqual => problem.with(constraint!(lhs <= rhs)),
            Relation::GreaterOrEqual => problem.with(constraint!(lhs >= rhs)),
            Relation::Equal => problem.with(constraint!(lhs == rhs)),
        };
    }

    let solution = match problem.solve() {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) => return Ok(SolveOutcome::infeasible()),
        Err(other) => return Err(SolverError::Backend(other.to_string())),
    };

    // Snap to exact 0/1 so downstream arithmetic sees clean binaries.
    let values: Vec<f64> = handles
        .iter()
        .map(|v| if solution.value(*v) > 0.5 { 1.0 } else { 0.0 })
        .collect();

    check_assignment(model, &values)?;

    let objective = model.objective().evaluate(&values);
    Ok(SolveOutcome::new(SolveStatus::Optimal, values, objective))
}

/// Re-check every constraint against the snapped assignment, naming the
/// chosen variables behind the first violation.
fn check_assignment(model: &MilpModel, values: &[f64]) -> Result<(), SolverError> {
    let Some(violated) = model
        .constraints()
        .iter()
        .find(|c| !c.is_satisfied(values, CHECK_TOLERANCE))
    else {
        return Ok(());
    };

    let chosen: Vec<&str> = violated
        .expr
        .terms()
        .iter()
        .filter(|(var, _)| values.get(var.index()).is_some_and(|v| *v > 0.5))
        .map(|(var, _)| model.var_name(*var))
        .collect();
    Err(SolverError::Backend(format!(
        "backend returned an assignment violating `{}` ({} {}, lhs {:.4}, chosen: [{}])",
        violated.name,
        violated.relation,
        violated.rhs,
        violated.expr.evaluate(values),
        chosen.join(", ")
    )))
}

fn to_expression(expr: &LinearExpr, handles: &[Variable]) -> Expression {
    let mut out = Expression::from(expr.constant());
    for (var, coefficient) in expr.terms() {
        out.add_mul(*coefficient, handles[var.index()]);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Knapsack: values 6, 5, 4 with weights 5, 4, 3 and capacity 7.
    fn knapsack() -> MilpModel {
        let mut model = MilpModel::new("knapsack");
        let items: Vec<_> = (0..3).map(|i| model.add_binary(format!("x{i}"))).collect();
        let weights = [5.0, 4.0, 3.0];
        let values = [6.0, 5.0, 4.0];

        let mut capacity = LinearExpr::new();
        let mut objective = LinearExpr::new();
        for (i, var) in items.iter().enumerate() {
            capacity.add_term(*var, weights[i]);
            objective.add_term(*var, values[i]);
        }
        model.add_constraint("capacity", capacity, Relation::LessOrEqual, 7.0);
        model.maximize(objective);
        model
    }

    #[test]
    fn test_solves_small_knapsack_exactly() {
        let outcome = MicroLpSolver::new()
            .solve(&knapsack(), Duration::from_secs(10))
            .unwrap();
        assert_eq!(outcome.status(), SolveStatus::Optimal);
        // Items 1 and 2 (weight 7, value 9) beat item 0 alone (value 6).
        assert_eq!(outcome.values(), &[0.0, 1.0, 1.0]);
        assert!((outcome.objective_value() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_reports_infeasible() {
        let mut model = MilpModel::new("infeasible");
        let a = model.add_binary("a");
        let b = model.add_binary("b");
        model.add_constraint("three", LinearExpr::sum([a, b]), Relation::Equal, 3.0);
        model.maximize(LinearExpr::sum([a, b]));

        let outcome = MicroLpSolver::new()
            .solve(&model, Duration::from_secs(10))
            .unwrap();
        assert_eq!(outcome.status(), SolveStatus::Infeasible);
        assert!(!outcome.has_solution());
    }

    #[test]
    fn test_violation_names_chosen_variables() {
        let model = knapsack();
        let err = check_assignment(&model, &[1.0, 1.0, 0.0]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("`capacity`"), "{msg}");
        assert!(msg.contains("chosen: [x0, x1]"), "{msg}");
        assert!(check_assignment(&model, &[0.0, 1.0, 1.0]).is_ok());
    }

    #[test]
    fn test_equality_and_lower_bound() {
        let mut model = MilpModel::new("pick_two");
        let vars: Vec<_> = (0..4).map(|i| model.add_binary(format!("x{i}"))).collect();
        model.add_constraint("two", LinearExpr::sum(vars.clone()), Relation::Equal, 2.0);
        model.add_constraint(
            "force_last",
            LinearExpr::new().with_term(vars[3], 1.0),
            Relation::GreaterOrEqual,
            1.0,
        );
        let objective = vars
            .iter()
            .enumerate()
            .fold(LinearExpr::new(), |e, (i, v)| e.with_term(*v, 10.0 - i as f64));
        model.maximize(objective);

        let outcome = MicroLpSolver::new()
            .solve(&model, Duration::from_secs(10))
            .unwrap();
        assert_eq!(outcome.values(), &[1.0, 0.0, 0.0, 1.0]);
    }
}
