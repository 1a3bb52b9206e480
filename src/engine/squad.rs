//! Squad selection: the 15-player 0/1 program.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::adjuster::{ScoredCandidate, ScoredPool};
use super::rules::{SquadRules, SQUAD_SIZE};
use super::{id_preference, solve_lexicographic, RequestContext};
use crate::solver::{LinearExpr, MilpModel, MilpSolver, Relation, VarId};
use crate::strategy::StrategyPlan;
use crate::types::{OptimizeError, Position, SquadInfeasibility};

/// A verified 15-player squad, members in ascending id order.
#[derive(Debug, Clone)]
pub struct Squad<'a> {
    pub members: Vec<ScoredCandidate<'a>>,
    pub proven_optimal: bool,
}

impl<'a> Squad<'a> {
    pub fn total_cost(&self) -> Decimal {
        self.members.iter().map(|m| m.price()).sum()
    }

    pub fn expected_points(&self) -> f64 {
        self.members.iter().map(|m| m.adjusted_points).sum()
    }
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Candidate index sets to try in order. Ruled-out candidates are left
/// out first; the full pool is only used if that is infeasible.
pub(crate) fn eligibility_passes(scored: &ScoredPool<'_>) -> Vec<Vec<usize>> {
    let all: Vec<usize> = (0..scored.len()).collect();
    let available: Vec<usize> = all
        .iter()
        .copied()
        .filter(|&i| !scored.get(i).candidate.status.is_ruled_out())
        .collect();

    if available.len() == all.len() {
        vec![all]
    } else {
        vec![available, all]
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Budget, squad size, position quotas, team cap and (optionally) the
/// cheap quota over the `in_squad` variables. `eligible[k]` is the pool
/// index behind `vars[k]`.
pub(crate) fn add_squad_constraints(
    model: &mut MilpModel,
    scored: &ScoredPool<'_>,
    eligible: &[usize],
    vars: &[VarId],
    rules: &SquadRules,
    cheap_quota: Option<u32>,
) {
    let budget = eligible
        .iter()
        .zip(vars)
        .fold(LinearExpr::new(), |e, (&i, &v)| {
            e.with_term(v, scored.get(i).price_f64())
        });
    let budget_rhs = rules.budget.to_f64().unwrap_or(0.0);
    model.add_constraint("budget", budget, Relation::LessOrEqual, budget_rhs);

    model.add_constraint(
        "squad_size",
        LinearExpr::sum(vars.iter().copied()),
        Relation::Equal,
        SQUAD_SIZE as f64,
    );

    for position in Position::ALL {
        let members = eligible
            .iter()
            .zip(vars)
            .filter(|(&i, _)| scored.get(i).position() == position)
            .map(|(_, &v)| v);
        model.add_constraint(
            format!("quota_{position}"),
            LinearExpr::sum(members),
            Relation::Equal,
            rules.quota(position) as f64,
        );
    }

    for team_id in scored.by_team().keys() {
        let members: Vec<VarId> = eligible
            .iter()
            .zip(vars)
            .filter(|(&i, _)| scored.get(i).team_id() == *team_id)
            .map(|(_, &v)| v)
            .collect();
        if members.len() as u32 > rules.max_per_team {
            model.add_constraint(
                format!("team_cap_{team_id}"),
                LinearExpr::sum(members),
                Relation::LessOrEqual,
                rules.max_per_team as f64,
            );
        }
    }

    if let Some(k) = cheap_quota {
        let cheap = eligible
            .iter()
            .zip(vars)
            .filter(|(&i, _)| rules.is_cheap(scored.get(i).candidate))
            .map(|(_, &v)| v);
        model.add_constraint("cheap_quota", LinearExpr::sum(cheap), Relation::GreaterOrEqual, k as f64);
    }
}

/// Id-order tie-break objective over `vars`: lower pool ranks (ids) win.
pub(crate) fn preference_objective(
    scored: &ScoredPool<'_>,
    eligible: &[usize],
    vars: &[VarId],
) -> LinearExpr {
    let n = scored.len();
    eligible
        .iter()
        .zip(vars)
        .fold(LinearExpr::new(), |e, (&i, &v)| e.with_term(v, id_preference(i, n)))
}

fn build_model(
    scored: &ScoredPool<'_>,
    eligible: &[usize],
    plan: &StrategyPlan,
    rules: &SquadRules,
) -> (MilpModel, Vec<VarId>) {
    let mut model = MilpModel::new("squad");
    let vars: Vec<VarId> = eligible
        .iter()
        .map(|&i| model.add_binary(format!("in_squad_{}", scored.get(i).id())))
        .collect();

    add_squad_constraints(&mut model, scored, eligible, &vars, rules, plan.cheap_quota());

    let objective = eligible
        .iter()
        .zip(&vars)
        .fold(LinearExpr::new(), |e, (&i, &v)| {
            let entry = scored.get(i);
            let weight = plan.objective_weight(
                entry.position(),
                entry.adjusted_points,
                entry.candidate.ownership_pct,
            );
            e.with_term(v, weight)
        });
    model.maximize(objective);

    (model, vars)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

pub fn select_squad<'a>(
    scored: &ScoredPool<'a>,
    plan: &StrategyPlan,
    rules: &SquadRules,
    solver: &dyn MilpSolver,
    ctx: &RequestContext,
) -> Result<Squad<'a>, OptimizeError> {
    let cheap_quota = plan.cheap_quota();
    if let Some(reason) = diagnose(scored, rules, cheap_quota) {
        info!(request_id = %ctx.request_id(), reason = %reason, "Squad infeasible before solving");
        return Err(OptimizeError::InfeasibleSquad(reason));
    }

    for (pass, eligible) in eligibility_passes(scored).into_iter().enumerate() {
        let (model, vars) = build_model(scored, &eligible, plan, rules);
        let preference = preference_objective(scored, &eligible, &vars);
        let outcome = solve_lexicographic(solver, &model, preference, ctx, "squad")?;
        if !outcome.has_solution() {
            debug!(
                request_id = %ctx.request_id(),
                pass,
                eligible = eligible.len(),
                "Squad pass infeasible"
            );
            continue;
        }

        let members: Vec<ScoredCandidate<'a>> = eligible
            .iter()
            .zip(&vars)
            .filter(|(_, &v)| outcome.is_selected(v))
            .map(|(&i, _)| scored.get(i))
            .collect();
        verify_squad(&members, rules, cheap_quota)?;

        let squad = Squad {
            members,
            proven_optimal: outcome.proven_optimal(),
        };
        debug!(
            request_id = %ctx.request_id(),
            pass,
            cost = %squad.total_cost(),
            points = squad.expected_points(),
            "Squad selected"
        );
        return Ok(squad);
    }

    // The necessary conditions all held, so only the combination fails.
    Err(OptimizeError::InfeasibleSquad(SquadInfeasibility::Combined {
        cheap_quota,
    }))
}

/// Name the constraint most likely responsible for infeasibility using
/// necessary conditions only. `None` means every check passes.
pub fn diagnose(
    scored: &ScoredPool<'_>,
    rules: &SquadRules,
    cheap_quota: Option<u32>,
) -> Option<SquadInfeasibility> {
    for position in Position::ALL {
        let available = scored.by_position(position).len();
        let required = rules.quota(position);
        if (available as u32) < required {
            return Some(SquadInfeasibility::PositionSupply {
                position,
                available,
                required,
            });
        }
    }

    let mut minimum_cost = Decimal::ZERO;
    for position in Position::ALL {
        let mut prices: Vec<Decimal> = scored
            .by_position(position)
            .iter()
            .map(|&i| scored.get(i).price())
            .collect();
        prices.sort();
        minimum_cost += prices
            .iter()
            .take(rules.quota(position) as usize)
            .sum::<Decimal>();
    }
    if minimum_cost > rules.budget {
        return Some(SquadInfeasibility::Budget {
            minimum_cost,
            budget: rules.budget,
        });
    }

    if let Some(required) = cheap_quota {
        let available = scored
            .entries()
            .iter()
            .filter(|e| rules.is_cheap(e.candidate))
            .count();
        if (available as u32) < required {
            return Some(SquadInfeasibility::CheapSupply {
                available,
                required,
            });
        }
    }

    let cap = rules.max_per_team as usize;
    for position in Position::ALL {
        let capacity: usize = scored
            .by_team()
            .values()
            .map(|members| {
                members
                    .iter()
                    .filter(|&&i| scored.get(i).position() == position)
                    .count()
                    .min(cap)
            })
            .sum();
        let required = rules.quota(position);
        if (capacity as u32) < required {
            return Some(SquadInfeasibility::TeamCap {
                position: Some(position),
                capacity,
                required,
                max_per_team: rules.max_per_team,
            });
        }
    }
    let capacity: usize = scored.by_team().values().map(|m| m.len().min(cap)).sum();
    if (capacity as u32) < SQUAD_SIZE {
        return Some(SquadInfeasibility::TeamCap {
            position: None,
            capacity,
            required: SQUAD_SIZE,
            max_per_team: rules.max_per_team,
        });
    }

    None
}

/// Exact re-check of every squad invariant. A violation here means the
/// backend returned a bad assignment.
pub(crate) fn verify_squad(
    members: &[ScoredCandidate<'_>],
    rules: &SquadRules,
    cheap_quota: Option<u32>,
) -> Result<(), OptimizeError> {
    let fault = |msg: String| Err(OptimizeError::Internal(format!("solver squad rejected: {msg}")));

    if members.len() as u32 != SQUAD_SIZE {
        return fault(format!("{} members, expected {SQUAD_SIZE}", members.len()));
    }

    let cost: Decimal = members.iter().map(|m| m.price()).sum();
    if cost > rules.budget {
        return fault(format!("cost {cost} exceeds budget {}", rules.budget));
    }

    for position in Position::ALL {
        let count = members.iter().filter(|m| m.position() == position).count() as u32;
        if count != rules.quota(position) {
            return fault(format!(
                "{count} {position}, expected {}",
                rules.quota(position)
            ));
        }
    }

    let mut per_team = std::collections::BTreeMap::<u32, u32>::new();
    for m in members {
        *per_team.entry(m.team_id()).or_default() += 1;
    }
    if let Some((team, count)) = per_team.iter().find(|(_, &c)| c > rules.max_per_team) {
        return fault(format!("{count} players from team {team}"));
    }

    if let Some(k) = cheap_quota {
        let cheap = members.iter().filter(|m| rules.is_cheap(m.candidate)).count() as u32;
        if cheap < k {
            return fault(format!("{cheap} cheap players, need {k}"));
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
    use crate::engine::test_support::*;
    use crate::solver::MicroLpSolver;
    use crate::strategy::{Strategy, StrategyParams};
    use crate::types::{CandidatePool, ErrorKind};
    use rust_decimal_macros::dec;

    fn plan(strategy: Strategy) -> StrategyPlan {
        StrategyPlan::new(strategy, StrategyParams::default())
    }

    fn solve(pool: &CandidatePool, strategy: Strategy) -> Result<Vec<u32>, OptimizeError> {
        let ctx = RequestContext::new(strategy);
        let scored = adjust(pool, &ctx);
        let squad = select_squad(
            &scored,
            &plan(strategy),
            &SquadRules::default(),
            &MicroLpSolver::new(),
            &ctx,
        )?;
        Ok(squad.members.iter().map(|m| m.id()).collect())
    }

    #[test]
    fn test_exact_pool_selected_whole() {
        let ids = solve(&exact_squad_pool(), Strategy::Balanced).unwrap();
        assert_eq!(ids, (1..=15).collect::<Vec<u32>>());
    }

    #[test]
    fn test_equal_value_pool_picks_lowest_ids() {
        let ids = solve(&uniform_pool(), Strategy::Balanced).unwrap();
        // GK 1,5; DEF 2,6,10,14,18; MID 3,7,11,15,19; FWD 4,8,12.
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 14, 15, 18, 19]);
    }

    #[test]
    fn test_league_squad_respects_rules() {
        let pool = league_pool();
        let ctx = RequestContext::new(Strategy::Balanced);
        let scored = adjust(&pool, &ctx);
        let rules = SquadRules::default();
        let squad = select_squad(&scored, &plan(Strategy::Balanced), &rules, &MicroLpSolver::new(), &ctx)
            .unwrap();

        assert!(verify_squad(&squad.members, &rules, None).is_ok());
        assert!(squad.total_cost() <= dec!(100.0));
        assert!(squad.proven_optimal);
    }

    #[test]
    fn test_budget_diagnosed() {
        let records: Vec<_> = exact_squad_records()
            .into_iter()
            .map(|mut r| {
                r.price = Some(7.0.into());
                r
            })
            .collect();
        let pool = CandidatePool::from_records(&teams(5), &records).unwrap();
        let err = solve(&pool, Strategy::Balanced).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InfeasibleSquad);
        assert!(matches!(
            err,
            OptimizeError::InfeasibleSquad(SquadInfeasibility::Budget { minimum_cost, .. })
                if minimum_cost == dec!(105.0)
        ));
    }

    #[test]
    fn test_position_supply_diagnosed() {
        let records: Vec<_> = exact_squad_records().into_iter().skip(1).collect();
        let pool = CandidatePool::from_records(&teams(5), &records).unwrap();
        let err = solve(&pool, Strategy::Balanced).unwrap_err();
        assert!(matches!(
            err,
            OptimizeError::InfeasibleSquad(SquadInfeasibility::PositionSupply {
                position: Position::Goalkeeper,
                ..
            })
        ));
    }

    #[test]
    fn test_team_cap_diagnosed() {
        // Moving the forwards to team 1 puts six players there and leaves
        // only twelve selectable under the cap.
        let mut records = exact_squad_records();
        for r in records.iter_mut() {
            if r.position.as_deref() == Some("FWD") {
                r.team = Some(1.0.into());
            }
        }
        let pool = CandidatePool::from_records(&teams(5), &records).unwrap();
        let err = solve(&pool, Strategy::Balanced).unwrap_err();
        assert!(matches!(
            err,
            OptimizeError::InfeasibleSquad(SquadInfeasibility::TeamCap { .. })
        ));
    }

    #[test]
    fn test_cheap_supply_diagnosed() {
        // Only GK 2 (4.0) and DEF 7 (4.0), MID 12, FWD 14/15 (4.5) are cheap: 5.
        let pool = exact_squad_pool();
        let ctx = RequestContext::new(Strategy::Enabling);
        let scored = adjust(&pool, &ctx);
        assert_eq!(diagnose(&scored, &SquadRules::default(), Some(5)), None);
        assert!(matches!(
            diagnose(&scored, &SquadRules::default(), Some(6)),
            Some(SquadInfeasibility::CheapSupply { available: 5, required: 6 })
        ));
    }

    #[test]
    fn test_eligibility_passes_exclude_ruled_out_first() {
        let mut records = exact_squad_records();
        records[0].status = Some("i".into());
        let pool = CandidatePool::from_records(&teams(5), &records).unwrap();
        let ctx = RequestContext::new(Strategy::Balanced);
        let scored = adjust(&pool, &ctx);

        let passes = eligibility_passes(&scored);
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].len(), 14);
        assert_eq!(passes[1].len(), 15);
    }

    #[test]
    fn test_verify_rejects_short_squad() {
        let pool = exact_squad_pool();
        let ctx = RequestContext::new(Strategy::Balanced);
        let scored = adjust(&pool, &ctx);
        let members: Vec<_> = scored.entries().iter().take(14).copied().collect();
        let err = verify_squad(&members, &SquadRules::default(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
