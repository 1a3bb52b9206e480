//! Starting-lineup selection.
//!
//! Two shapes: a second 0/1 program over the 15 chosen players, or (for
//! the bench-cost strategy) one joint program that picks squad and lineup
//! together and charges for money left on the bench.

use tracing::debug;

use super::adjuster::{ScoredCandidate, ScoredPool};
use super::rules::{SquadRules, LINEUP_SIZE};
use super::squad::{
    add_squad_constraints, eligibility_passes, preference_objective, verify_squad, Squad,
};
use super::{id_preference, solve_lexicographic, RequestContext};
use crate::solver::{LinearExpr, MilpModel, MilpSolver, Relation, VarId};
use crate::strategy::StrategyPlan;
use crate::types::{OptimizeError, Position, SquadInfeasibility};

/// Eleven starters drawn from a squad, in ascending id order.
#[derive(Debug, Clone)]
pub struct Lineup<'a> {
    pub starters: Vec<ScoredCandidate<'a>>,
    pub proven_optimal: bool,
}

impl<'a> Lineup<'a> {
    pub fn contains(&self, id: u32) -> bool {
        self.starters.iter().any(|s| s.id() == id)
    }

    pub fn expected_points(&self) -> f64 {
        self.starters.iter().map(|s| s.adjusted_points).sum()
    }
}

/// Lineup size and per-position formation bounds over `vars`.
/// `positions[k]` is the position behind `vars[k]`.
fn add_formation_constraints(
    model: &mut MilpModel,
    vars: &[VarId],
    positions: &[Position],
    rules: &SquadRules,
) {
    model.add_constraint(
        "lineup_size",
        LinearExpr::sum(vars.iter().copied()),
        Relation::Equal,
        LINEUP_SIZE as f64,
    );
    for position in Position::ALL {
        let members: Vec<VarId> = vars
            .iter()
            .zip(positions)
            .filter(|(_, &p)| p == position)
            .map(|(&v, _)| v)
            .collect();
        let bounds = rules.bounds(position);
        model.add_constraint(
            format!("lineup_min_{position}"),
            LinearExpr::sum(members.clone()),
            Relation::GreaterOrEqual,
            bounds.min as f64,
        );
        model.add_constraint(
            format!("lineup_max_{position}"),
            LinearExpr::sum(members),
            Relation::LessOrEqual,
            bounds.max as f64,
        );
    }
}

// ---------------------------------------------------------------------------
// Two-stage
// ---------------------------------------------------------------------------

pub fn select_lineup<'a>(
    squad: &Squad<'a>,
    rules: &SquadRules,
    solver: &dyn MilpSolver,
    ctx: &RequestContext,
) -> Result<Lineup<'a>, OptimizeError> {
    let mut model = MilpModel::new("lineup");
    let vars: Vec<VarId> = squad
        .members
        .iter()
        .map(|m| model.add_binary(format!("in_lineup_{}", m.id())))
        .collect();
    let positions: Vec<Position> = squad.members.iter().map(|m| m.position()).collect();
    add_formation_constraints(&mut model, &vars, &positions, rules);

    let objective = squad
        .members
        .iter()
        .zip(&vars)
        .fold(LinearExpr::new(), |e, (m, &v)| e.with_term(v, m.adjusted_points));
    model.maximize(objective);

    // Members are in id order, so their index is their id rank.
    let n = squad.members.len();
    let preference = vars
        .iter()
        .enumerate()
        .fold(LinearExpr::new(), |e, (rank, &v)| e.with_term(v, id_preference(rank, n)));

    let outcome = solve_lexicographic(solver, &model, preference, ctx, "lineup")?;
    if !outcome.has_solution() {
        return Err(OptimizeError::InfeasibleLineup(
            "no formation-valid lineup exists within the selected squad".to_string(),
        ));
    }

    let starters: Vec<ScoredCandidate<'a>> = squad
        .members
        .iter()
        .zip(&vars)
        .filter(|(_, &v)| outcome.is_selected(v))
        .map(|(m, _)| *m)
        .collect();
    verify_lineup(&starters, squad, rules)?;

    let lineup = Lineup {
        starters,
        proven_optimal: outcome.proven_optimal(),
    };
    debug!(
        request_id = %ctx.request_id(),
        points = lineup.expected_points(),
        "Lineup selected"
    );
    Ok(lineup)
}

// ---------------------------------------------------------------------------
// Joint
// ---------------------------------------------------------------------------

/// Maximise Σ starter value − λ × Σ bench price in one program.
pub fn select_joint<'a>(
    scored: &ScoredPool<'a>,
    plan: &StrategyPlan,
    rules: &SquadRules,
    solver: &dyn MilpSolver,
    ctx: &RequestContext,
) -> Result<(Squad<'a>, Lineup<'a>), OptimizeError> {
    let cheap_quota = plan.cheap_quota();
    if let Some(reason) = super::squad::diagnose(scored, rules, cheap_quota) {
        return Err(OptimizeError::InfeasibleSquad(reason));
    }

    let lambda = plan.bench_cost_penalty();

    for (pass, eligible) in eligibility_passes(scored).into_iter().enumerate() {
        let mut model = MilpModel::new("joint");
        let in_squad: Vec<VarId> = eligible
            .iter()
            .map(|&i| model.add_binary(format!("in_squad_{}", scored.get(i).id())))
            .collect();
        let in_lineup: Vec<VarId> = eligible
            .iter()
            .map(|&i| model.add_binary(format!("in_lineup_{}", scored.get(i).id())))
            .collect();

        add_squad_constraints(&mut model, scored, &eligible, &in_squad, rules, cheap_quota);
        for ((&i, &s), &l) in eligible.iter().zip(&in_squad).zip(&in_lineup) {
            model.add_constraint(
                format!("starter_in_squad_{}", scored.get(i).id()),
                LinearExpr::new().with_term(l, 1.0).with_term(s, -1.0),
                Relation::LessOrEqual,
                0.0,
            );
        }
        let positions: Vec<Position> = eligible.iter().map(|&i| scored.get(i).position()).collect();
        add_formation_constraints(&mut model, &in_lineup, &positions, rules);

        // Σ l·(adj + λp) − Σ s·λp
        let mut objective = LinearExpr::new();
        for ((&i, &s), &l) in eligible.iter().zip(&in_squad).zip(&in_lineup) {
            let entry = scored.get(i);
            let bench_cost = lambda * entry.price_f64();
            objective.add_term(l, entry.adjusted_points + bench_cost);
            objective.add_term(s, -bench_cost);
        }
        model.maximize(objective);

        let mut preference = preference_objective(scored, &eligible, &in_squad);
        for (term, coefficient) in preference_objective(scored, &eligible, &in_lineup).terms() {
            preference.add_term(*term, *coefficient);
        }

        let outcome = solve_lexicographic(solver, &model, preference, ctx, "joint")?;
        if !outcome.has_solution() {
            debug!(request_id = %ctx.request_id(), pass, "Joint pass infeasible");
            continue;
        }

        let members: Vec<ScoredCandidate<'a>> = eligible
            .iter()
            .zip(&in_squad)
            .filter(|(_, &v)| outcome.is_selected(v))
            .map(|(&i, _)| scored.get(i))
            .collect();
        verify_squad(&members, rules, cheap_quota)?;
        let squad = Squad {
            members,
            proven_optimal: outcome.proven_optimal(),
        };

        let starters: Vec<ScoredCandidate<'a>> = eligible
            .iter()
            .zip(&in_lineup)
            .filter(|(_, &v)| outcome.is_selected(v))
            .map(|(&i, _)| scored.get(i))
            .collect();
        verify_lineup(&starters, &squad, rules)?;
        let lineup = Lineup {
            starters,
            proven_optimal: outcome.proven_optimal(),
        };

        debug!(
            request_id = %ctx.request_id(),
            pass,
            lambda,
            cost = %squad.total_cost(),
            points = lineup.expected_points(),
            "Joint squad and lineup selected"
        );
        return Ok((squad, lineup));
    }

    Err(OptimizeError::InfeasibleSquad(SquadInfeasibility::Combined {
        cheap_quota,
    }))
}

/// Exact re-check of the lineup invariants.
pub(crate) fn verify_lineup(
    starters: &[ScoredCandidate<'_>],
    squad: &Squad<'_>,
    rules: &SquadRules,
) -> Result<(), OptimizeError> {
    if starters.len() as u32 != LINEUP_SIZE {
        return Err(OptimizeError::Internal(format!(
            "solver lineup rejected: {} starters, expected {LINEUP_SIZE}",
            starters.len()
        )));
    }
    if let Some(outsider) = starters
        .iter()
        .find(|s| !squad.members.iter().any(|m| m.id() == s.id()))
    {
        return Err(OptimizeError::Internal(format!(
            "solver lineup rejected: starter {} is not in the squad",
            outsider.id()
        )));
    }
    for position in Position::ALL {
        let count = starters.iter().filter(|s| s.position() == position).count() as u32;
        let bounds = rules.bounds(position);
        if count < bounds.min || count > bounds.max {
            return Err(OptimizeError::Internal(format!(
                "solver lineup rejected: {count} {position}, allowed {}..={}",
                bounds.min, bounds.max
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adjuster::adjust;
    use crate::engine::squad::select_squad;
    use crate::engine::test_support::*;
    use crate::solver::MicroLpSolver;
    use crate::strategy::{Strategy, StrategyParams};
    use crate::types::{CandidatePool, ErrorKind};

    fn ids(players: &[ScoredCandidate<'_>]) -> Vec<u32> {
        players.iter().map(|p| p.id()).collect()
    }

    #[test]
    fn test_lineup_is_best_eleven_under_formation() {
        let pool = exact_squad_pool();
        let ctx = RequestContext::new(Strategy::Balanced);
        let scored = adjust(&pool, &ctx);
        let rules = SquadRules::default();
        let solver = MicroLpSolver::new();
        let plan = StrategyPlan::new(Strategy::Balanced, StrategyParams::default());

        let squad = select_squad(&scored, &plan, &rules, &solver, &ctx).unwrap();
        let lineup = select_lineup(&squad, &rules, &solver, &ctx).unwrap();

        // GK 5; DEF 6,5,4,3; MID 8,7,6,5,4; FWD 9 -> 62 points, 1-4-5-1.
        assert_eq!(ids(&lineup.starters), vec![1, 3, 4, 5, 6, 8, 9, 10, 11, 12, 13]);
        assert!((lineup.expected_points() - 62.0).abs() < 1e-9);
        assert!(lineup.proven_optimal);
    }

    #[test]
    fn test_equal_value_lineup_picks_lowest_ids() {
        let pool = uniform_pool();
        let ctx = RequestContext::new(Strategy::Balanced);
        let scored = adjust(&pool, &ctx);
        let rules = SquadRules::default();
        let solver = MicroLpSolver::new();
        let plan = StrategyPlan::new(Strategy::Balanced, StrategyParams::default());

        let squad = select_squad(&scored, &plan, &rules, &solver, &ctx).unwrap();
        let lineup = select_lineup(&squad, &rules, &solver, &ctx).unwrap();

        // One GK; then lowest outfield ids until eleven: DEF 2,6,10,14.
        assert_eq!(ids(&lineup.starters), vec![1, 2, 3, 4, 6, 7, 8, 10, 11, 12, 14]);
    }

    #[test]
    fn test_equal_value_joint_picks_lowest_ids() {
        let pool = uniform_pool();
        let ctx = RequestContext::new(Strategy::CheapBench);
        let scored = adjust(&pool, &ctx);
        let plan = StrategyPlan::new(Strategy::CheapBench, StrategyParams::default());

        let (squad, lineup) =
            select_joint(&scored, &plan, &SquadRules::default(), &MicroLpSolver::new(), &ctx)
                .unwrap();
        assert_eq!(
            ids(&squad.members),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 14, 15, 18, 19]
        );
        assert_eq!(ids(&lineup.starters), vec![1, 2, 3, 4, 6, 7, 8, 10, 11, 12, 14]);
    }

    fn joint_with_penalty(pool: &CandidatePool, lambda: f64) -> (f64, rust_decimal::Decimal) {
        let ctx = RequestContext::new(Strategy::CheapBench);
        let scored = adjust(pool, &ctx);
        let rules = SquadRules::default();
        let params = StrategyParams {
            bench_cost_penalty: lambda,
            ..StrategyParams::default()
        };
        let plan = StrategyPlan::new(Strategy::CheapBench, params);

        let (squad, lineup) =
            select_joint(&scored, &plan, &rules, &MicroLpSolver::new(), &ctx).unwrap();
        assert!(verify_squad(&squad.members, &rules, None).is_ok());
        assert!(verify_lineup(&lineup.starters, &squad, &rules).is_ok());

        let bench_cost = squad
            .members
            .iter()
            .filter(|m| !lineup.contains(m.id()))
            .map(|m| m.price())
            .sum();
        (lineup.expected_points(), bench_cost)
    }

    #[test]
    fn test_joint_penalty_trades_lineup_points_for_bench_savings() {
        let pool = league_pool();
        let (free_points, free_bench) = joint_with_penalty(&pool, 0.0);
        let (taxed_points, taxed_bench) = joint_with_penalty(&pool, 5.0);

        assert!(taxed_bench <= free_bench);
        assert!(taxed_points <= free_points + 1e-3);
    }

    #[test]
    fn test_joint_budget_infeasible() {
        let records: Vec<_> = exact_squad_records()
            .into_iter()
            .map(|mut r| {
                r.price = Some(7.0.into());
                r
            })
            .collect();
        let pool = CandidatePool::from_records(&teams(5), &records).unwrap();
        let ctx = RequestContext::new(Strategy::CheapBench);
        let scored = adjust(&pool, &ctx);
        let plan = StrategyPlan::new(Strategy::CheapBench, StrategyParams::default());

        let err = select_joint(&scored, &plan, &SquadRules::default(), &MicroLpSolver::new(), &ctx)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InfeasibleSquad);
    }

    #[test]
    fn test_verify_lineup_rejects_bad_formation() {
        let pool = exact_squad_pool();
        let ctx = RequestContext::new(Strategy::Balanced);
        let scored = adjust(&pool, &ctx);
        let squad = Squad {
            members: scored.entries().to_vec(),
            proven_optimal: true,
        };
        // Both goalkeepers start.
        let starters: Vec<_> = scored
            .entries()
            .iter()
            .filter(|e| ![7, 12, 14, 15].contains(&e.id()))
            .copied()
            .collect();
        let err = verify_lineup(&starters, &squad, &SquadRules::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
