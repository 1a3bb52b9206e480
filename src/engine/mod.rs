//! Optimization engine — score adjustment → squad → lineup → bench →
//! captaincy → report.
//!
//! One `Optimizer` is built at startup and shared; each request gets its
//! own `RequestContext` (request id + tracing span) which is passed into
//! every stage.

pub mod adjuster;
pub mod bench;
pub mod captaincy;
pub mod lineup;
pub mod report;
pub mod rules;
pub mod squad;

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

use crate::solver::{LinearExpr, MilpModel, MilpSolver, Relation, SolveOutcome, SolveStatus};
use crate::strategy::{OptimizeRequest, Strategy, StrategyPlan};
use crate::types::{CandidatePool, ErrorKind, OptimizeError};
use report::OptimizationReport;
use rules::SquadRules;

/// Relative slack on the pinned value objective during the tie-break
/// solve. Value differences below this count as ties.
pub(crate) const OBJECTIVE_TOLERANCE: f64 = 1e-6;

/// Tie-break weight for the candidate at `rank` (0 = lowest id) out of
/// `n`: (n − rank)². Strictly decreasing and integer-valued, so any two
/// choices it separates differ by at least 1.
pub(crate) fn id_preference(rank: usize, n: usize) -> f64 {
    let weight = n.saturating_sub(rank) as f64;
    weight * weight
}

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

/// Forward-only pipeline progress for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Validated,
    SquadSolved,
    LineupSolved,
    Assembled,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Validated => write!(f, "validated"),
            PipelineStage::SquadSolved => write!(f, "squad_solved"),
            PipelineStage::LineupSolved => write!(f, "lineup_solved"),
            PipelineStage::Assembled => write!(f, "assembled"),
        }
    }
}

/// Request-scoped logging context and time budget. Every solve in the
/// request draws from the same deadline.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    strategy: Strategy,
    span: Span,
    stage: Cell<Option<PipelineStage>>,
    started: Instant,
    time_limit: Duration,
}

impl RequestContext {
    pub fn new(strategy: Strategy) -> Self {
        let request_id = Uuid::new_v4();
        let span = info_span!("optimize", request_id = %request_id, strategy = %strategy);
        Self {
            request_id,
            strategy,
            span,
            stage: Cell::new(None),
            started: Instant::now(),
            time_limit: SquadRules::default().solve_timeout,
        }
    }

    /// Replace the request's total solve budget.
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn stage(&self) -> Option<PipelineStage> {
        self.stage.get()
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Budget left before the deadline; `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.time_limit
            .checked_sub(self.started.elapsed())
            .filter(|left| !left.is_zero())
    }

    /// Record forward progress. Stages never move backwards.
    pub fn advance(&self, next: PipelineStage) {
        let current = self.stage.get();
        debug_assert!(current.map_or(true, |c| c < next), "{current:?} -> {next}");
        self.stage.set(Some(next));
        debug!(
            request_id = %self.request_id,
            stage = %next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Pipeline stage reached"
        );
    }

    fn timed_out(&self, stage: &'static str) -> OptimizeError {
        OptimizeError::SolveTimeout {
            stage,
            timeout_secs: self.time_limit.as_secs(),
        }
    }
}

/// Run one model through the solver with whatever is left of the request
/// budget, turning a bare time-out into `SolveTimeout` and backend
/// failures into `Internal`. Infeasibility is left to the caller, which
/// knows how to explain it.
pub(crate) fn run_model(
    solver: &dyn MilpSolver,
    model: &MilpModel,
    ctx: &RequestContext,
    stage: &'static str,
) -> Result<SolveOutcome, OptimizeError> {
    let Some(timeout) = ctx.remaining() else {
        return Err(ctx.timed_out(stage));
    };

    let started = Instant::now();
    let outcome = solver
        .solve(model, timeout)
        .map_err(|e| OptimizeError::Internal(format!("{stage} solve failed: {e}")))?;

    debug!(
        request_id = %ctx.request_id(),
        stage,
        status = %outcome.status(),
        objective = outcome.objective_value(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Solve finished"
    );

    match outcome.status() {
        SolveStatus::TimedOut => Err(ctx.timed_out(stage)),
        SolveStatus::Feasible => {
            warn!(
                request_id = %ctx.request_id(),
                stage,
                "Time limit reached; using feasible incumbent (not proven optimal)"
            );
            Ok(outcome)
        }
        SolveStatus::Optimal | SolveStatus::Infeasible => Ok(outcome),
    }
}

/// Solve `model` for its value objective, then re-solve with that value
/// pinned (within `OBJECTIVE_TOLERANCE`) maximising `preference`, so ties
/// are settled by the preference rather than by the backend.
///
/// The second solve is skipped when the first finds nothing or is not
/// proven optimal. If the deadline runs out during it, the first
/// solution stands.
pub(crate) fn solve_lexicographic(
    solver: &dyn MilpSolver,
    model: &MilpModel,
    preference: LinearExpr,
    ctx: &RequestContext,
    stage: &'static str,
) -> Result<SolveOutcome, OptimizeError> {
    let outcome = run_model(solver, model, ctx, stage)?;
    if !outcome.proven_optimal() {
        return Ok(outcome);
    }

    let value = model.objective().evaluate(outcome.values());
    let mut pinned = model.clone();
    pinned.add_constraint(
        "value_floor",
        model.objective().clone(),
        Relation::GreaterOrEqual,
        value - OBJECTIVE_TOLERANCE * value.abs().max(1.0),
    );
    pinned.maximize(preference);

    match run_model(solver, &pinned, ctx, stage) {
        Ok(refined) if refined.has_solution() => Ok(refined),
        Ok(_) => {
            warn!(
                request_id = %ctx.request_id(),
                stage,
                "Tie-break solve found no assignment; keeping the first solution"
            );
            Ok(outcome)
        }
        Err(OptimizeError::SolveTimeout { .. }) => {
            warn!(
                request_id = %ctx.request_id(),
                stage,
                "Time limit reached during tie-break solve; keeping the first solution"
            );
            Ok(outcome)
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Runs the full selection pipeline. Stateless between requests; safe to
/// share behind an `Arc` across worker threads.
pub struct Optimizer {
    rules: SquadRules,
    solver: Arc<dyn MilpSolver>,
}

impl Optimizer {
    pub fn new(rules: SquadRules, solver: Arc<dyn MilpSolver>) -> Result<Self, OptimizeError> {
        rules.validate()?;
        Ok(Self { rules, solver })
    }

    pub fn rules(&self) -> &SquadRules {
        &self.rules
    }

    /// Run the pipeline for a resolved plan.
    pub fn optimize(
        &self,
        pool: &CandidatePool,
        plan: &StrategyPlan,
        ctx: &RequestContext,
    ) -> Result<OptimizationReport, OptimizeError> {
        let _entered = ctx.span().enter();
        let solver = self.solver.as_ref();
        let rules = match plan.params.cheap_price_threshold {
            Some(threshold) => self.rules.with_uniform_cheap_threshold(threshold),
            None => self.rules.clone(),
        };

        let scored = adjuster::adjust(pool, ctx);
        ctx.advance(PipelineStage::Validated);

        let (squad, lineup) = if plan.is_joint() {
            let (squad, lineup) = lineup::select_joint(&scored, plan, &rules, solver, ctx)?;
            ctx.advance(PipelineStage::SquadSolved);
            ctx.advance(PipelineStage::LineupSolved);
            (squad, lineup)
        } else {
            let squad = squad::select_squad(&scored, plan, &rules, solver, ctx)?;
            ctx.advance(PipelineStage::SquadSolved);
            let lineup = lineup::select_lineup(&squad, &rules, solver, ctx)?;
            ctx.advance(PipelineStage::LineupSolved);
            (squad, lineup)
        };

        let bench = bench::rank_bench(&squad, &lineup);
        let captaincy = captaincy::select_captaincy(&lineup)?;
        let report = report::assemble(pool, plan.strategy, &squad, &lineup, &bench, &captaincy);
        ctx.advance(PipelineStage::Assembled);

        info!(
            request_id = %ctx.request_id(),
            squad_cost = %report.summary.squad_cost,
            lineup_points = report.summary.lineup_expected_points,
            captain = captaincy.captain.id(),
            proven_optimal = report.summary.proven_optimal,
            "Optimization complete"
        );
        Ok(report)
    }

    /// Resolve raw request parameters and run the pipeline, always
    /// returning the uniform report shape.
    pub fn run(&self, pool: &CandidatePool, request: &OptimizeRequest) -> OptimizationReport {
        let plan = match request.resolve() {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Rejected optimization request");
                return OptimizationReport::failure(&e, None);
            }
        };

        let ctx = RequestContext::new(plan.strategy).with_time_limit(self.rules.solve_timeout);
        match self.optimize(pool, &plan, &ctx) {
            Ok(report) => report,
            Err(e) => {
                let _entered = ctx.span().enter();
                match e.kind() {
                    ErrorKind::InfeasibleLineup | ErrorKind::Internal => warn!(
                        request_id = %ctx.request_id(),
                        kind = %e.kind(),
                        stage = ?ctx.stage(),
                        error = %e,
                        "Optimization failed with an internal fault"
                    ),
                    _ => info!(
                        request_id = %ctx.request_id(),
                        kind = %e.kind(),
                        error = %e,
                        "Optimization failed"
                    ),
                }
                OptimizationReport::failure(&e, Some(plan.strategy))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    //! Pool builders shared by the engine's unit tests.

    use crate::types::{CandidatePool, CandidateRecord, TeamRecord};

    pub fn record(
        id: u32,
        team: u32,
        position: &str,
        price: f64,
        points: f64,
    ) -> CandidateRecord {
        CandidateRecord {
            id: Some((id as f64).into()),
            name: Some(format!("{position}-{id}")),
            team: Some((team as f64).into()),
            position: Some(position.to_string()),
            price: Some(price.into()),
            expected_points: Some(points.into()),
            ..Default::default()
        }
    }

    pub fn teams(n: u32) -> Vec<TeamRecord> {
        (1..=n)
            .map(|id| TeamRecord {
                id: Some((id as f64).into()),
                name: Some(format!("Team {id}")),
            })
            .collect()
    }

    /// Exactly 2 GK / 5 DEF / 5 MID / 3 FWD across five teams (three
    /// each), total price 75.0.
    pub fn exact_squad_records() -> Vec<CandidateRecord> {
        vec![
            record(1, 1, "GK", 5.0, 5.0),
            record(2, 1, "GK", 4.0, 3.0),
            record(3, 1, "DEF", 5.0, 6.0),
            record(4, 2, "DEF", 5.0, 5.0),
            record(5, 2, "DEF", 5.0, 4.0),
            record(6, 2, "DEF", 4.5, 3.0),
            record(7, 3, "DEF", 4.0, 2.0),
            record(8, 3, "MID", 6.0, 8.0),
            record(9, 3, "MID", 5.5, 7.0),
            record(10, 4, "MID", 5.0, 6.0),
            record(11, 4, "MID", 5.0, 5.0),
            record(12, 4, "MID", 4.5, 4.0),
            record(13, 5, "FWD", 7.0, 9.0),
            record(14, 5, "FWD", 4.5, 2.0),
            record(15, 5, "FWD", 4.5, 1.0),
        ]
    }

    pub fn exact_squad_pool() -> CandidatePool {
        CandidatePool::from_records(&teams(5), &exact_squad_records()).unwrap()
    }

    /// Ten teams, each with 1 GK, 2 DEF, 2 MID, 1 FWD. Points and prices
    /// vary by team so the optimum is unique.
    pub fn league_records() -> Vec<CandidateRecord> {
        let mut records = Vec::new();
        let mut id = 1;
        for team in 1..=10u32 {
            let t = team as f64;
            let layout: [(&str, f64, f64); 6] = [
                ("GK", 4.0 + (t % 3.0) * 0.5, 3.0 + t * 0.3),
                ("DEF", 4.0 + (t % 4.0) * 0.5, 3.5 + t * 0.25),
                ("DEF", 5.0 + (t % 2.0) * 0.5, 4.0 + t * 0.2),
                ("MID", 5.0 + (t % 5.0) * 0.5, 4.5 + t * 0.35),
                ("MID", 7.0 + (t % 3.0) * 1.0, 6.0 + t * 0.4),
                ("FWD", 6.0 + (t % 4.0) * 1.0, 5.0 + t * 0.45),
            ];
            for (position, price, points) in layout {
                records.push(record(id, team, position, price, points));
                id += 1;
            }
        }
        records
    }

    pub fn league_pool() -> CandidatePool {
        CandidatePool::from_records(&teams(10), &league_records()).unwrap()
    }

    /// Forty identical players (price 5.0, 4 points), each on its own
    /// team, positions cycling GK, DEF, MID, FWD by id. Every valid
    /// squad ties on value.
    pub fn uniform_records() -> Vec<CandidateRecord> {
        const CYCLE: [&str; 4] = ["GK", "DEF", "MID", "FWD"];
        (1..=40u32)
            .map(|id| record(id, id, CYCLE[(id as usize - 1) % 4], 5.0, 4.0))
            .collect()
    }

    pub fn uniform_pool() -> CandidatePool {
        CandidatePool::from_records(&teams(40), &uniform_records()).unwrap()
    }
}
