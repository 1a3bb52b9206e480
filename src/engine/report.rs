//! Result assembly: the caller-facing report shape.
//!
//! Success and failure share one shape. On failure the collections are
//! empty, the summary is zeroed and `error` carries `{kind, reason}`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::adjuster::ScoredCandidate;
use super::bench::by_value_desc;
use super::captaincy::Captaincy;
use super::lineup::Lineup;
use super::squad::Squad;
use crate::strategy::Strategy;
use crate::types::{CandidatePool, ErrorKind, OptimizeError, Position};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntry {
    pub id: u32,
    pub name: String,
    pub team: String,
    pub position: Position,
    pub price: Decimal,
    pub expected_points: f64,
    pub next_opponent: Option<String>,
    pub is_home: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub squad_cost: Decimal,
    pub squad_expected_points: f64,
    pub lineup_expected_points: f64,
    pub strategy: String,
    /// Absent only in failure reports.
    pub captain: Option<PlayerEntry>,
    pub vice_captain: Option<PlayerEntry>,
    pub proven_optimal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub lineup: Vec<PlayerEntry>,
    pub bench: Vec<PlayerEntry>,
    pub summary: Summary,
    pub error: Option<ErrorBody>,
}

impl OptimizationReport {
    pub fn failure(err: &OptimizeError, strategy: Option<Strategy>) -> Self {
        Self {
            lineup: Vec::new(),
            bench: Vec::new(),
            summary: Summary {
                strategy: strategy.map(|s| s.name().to_string()).unwrap_or_default(),
                ..Summary::default()
            },
            error: Some(ErrorBody {
                kind: err.kind(),
                reason: err.reason(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn entry(pool: &CandidatePool, scored: &ScoredCandidate<'_>) -> PlayerEntry {
    let c = scored.candidate;
    PlayerEntry {
        id: c.id,
        name: c.name.clone(),
        team: pool.team_name(c.team_id).to_string(),
        position: c.position,
        price: c.price,
        expected_points: round2(scored.adjusted_points),
        next_opponent: c.next_opponent.as_ref().map(|o| o.opponent.clone()),
        is_home: c.next_opponent.as_ref().map(|o| o.is_home),
    }
}

/// Build the success report. `bench` must already be ranked.
pub fn assemble(
    pool: &CandidatePool,
    strategy: Strategy,
    squad: &Squad<'_>,
    lineup: &Lineup<'_>,
    bench: &[ScoredCandidate<'_>],
    captaincy: &Captaincy<'_>,
) -> OptimizationReport {
    let mut starters = lineup.starters.clone();
    starters.sort_by(|a, b| a.position().cmp(&b.position()).then_with(|| by_value_desc(a, b)));

    OptimizationReport {
        lineup: starters.iter().map(|s| entry(pool, s)).collect(),
        bench: bench.iter().map(|b| entry(pool, b)).collect(),
        summary: Summary {
            squad_cost: squad.total_cost().round_dp(2),
            squad_expected_points: round2(squad.expected_points()),
            lineup_expected_points: round2(lineup.expected_points()),
            strategy: strategy.name().to_string(),
            captain: Some(entry(pool, &captaincy.captain)),
            vice_captain: Some(entry(pool, &captaincy.vice_captain)),
            proven_optimal: squad.proven_optimal && lineup.proven_optimal,
        },
        error: None,
    }
}
