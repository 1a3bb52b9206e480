//! Game rules: squad schema, formation bounds, budget, team cap and the
//! cheap-player price table.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

use crate::types::{Candidate, OptimizeError, Position};

pub const SQUAD_SIZE: u32 = 15;
pub const LINEUP_SIZE: u32 = 11;

/// Inclusive per-position lineup bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SquadRules {
    pub budget: Decimal,
    pub max_per_team: u32,
    /// Exact squad count per position, indexed by `Position::index`.
    pub squad_quota: [u32; 4],
    pub lineup_bounds: [Bounds; 4],
    /// A candidate at or under its position's threshold counts as cheap.
    pub cheap_thresholds: [Decimal; 4],
    pub solve_timeout: Duration,
}

impl Default for SquadRules {
    fn default() -> Self {
        Self {
            budget: dec!(100.0),
            max_per_team: 3,
            squad_quota: [2, 5, 5, 3],
            lineup_bounds: [
                Bounds { min: 1, max: 1 },
                Bounds { min: 3, max: 5 },
                Bounds { min: 2, max: 5 },
                Bounds { min: 1, max: 3 },
            ],
            cheap_thresholds: [dec!(4.0), dec!(4.0), dec!(4.5), dec!(4.5)],
            solve_timeout: Duration::from_secs(30),
        }
    }
}

impl SquadRules {
    pub fn quota(&self, position: Position) -> u32 {
        self.squad_quota[position.index()]
    }

    pub fn bounds(&self, position: Position) -> Bounds {
        self.lineup_bounds[position.index()]
    }

    pub fn cheap_threshold(&self, position: Position) -> Decimal {
        self.cheap_thresholds[position.index()]
    }

    pub fn is_cheap(&self, candidate: &Candidate) -> bool {
        candidate.price <= self.cheap_threshold(candidate.position)
    }

    /// Copy of these rules with one cheap threshold for every position.
    pub fn with_uniform_cheap_threshold(&self, threshold: Decimal) -> Self {
        Self {
            cheap_thresholds: [threshold; 4],
            ..self.clone()
        }
    }

    /// The lineup bounds must be satisfiable from any squad that meets
    /// the quotas; otherwise a feasible squad could still yield no lineup.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        let fail = |msg: String| Err(OptimizeError::Internal(format!("inconsistent rules: {msg}")));

        if self.budget <= Decimal::ZERO {
            return fail(format!("budget must be positive, got {}", self.budget));
        }
        if self.max_per_team == 0 {
            return fail("max_per_team must be at least 1".into());
        }
        if self.solve_timeout.is_zero() {
            return fail("solve timeout must be positive".into());
        }

        let quota_total: u32 = self.squad_quota.iter().sum();
        if quota_total != SQUAD_SIZE {
            return fail(format!("squad quotas sum to {quota_total}, expected {SQUAD_SIZE}"));
        }

        let mut min_total = 0;
        let mut max_total = 0;
        for position in Position::ALL {
            let bounds = self.bounds(position);
            let quota = self.quota(position);
            if bounds.min > bounds.max {
                return fail(format!("{position} lineup min {} > max {}", bounds.min, bounds.max));
            }
            if bounds.min > quota {
                return fail(format!("{position} lineup min {} > squad quota {quota}", bounds.min));
            }
            min_total += bounds.min;
            max_total += bounds.max.min(quota);
        }
        if min_total > LINEUP_SIZE || max_total < LINEUP_SIZE {
            return fail(format!(
                "lineup bounds admit {min_total}..={max_total} players, need {LINEUP_SIZE}"
            ));
        }
        Ok(())
    }
}
