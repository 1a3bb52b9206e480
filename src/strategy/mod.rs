//! Strategy table — the closed set of optimization objectives and their
//! tuning parameters.
//!
//! Every strategy's effect on the squad objective is expressed by
//! `StrategyPlan::objective_weight` plus two flags (cheap quota, joint
//! solve). Adding a strategy means adding a row here, nothing elsewhere.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::types::{Numeric, OptimizeError, Position};

// ---------------------------------------------------------------------------
// Parameter ranges
// ---------------------------------------------------------------------------

pub const WEIGHT_RANGE: RangeInclusive<f64> = 1.0..=3.0;
pub const DIFFERENTIAL_FACTOR_RANGE: RangeInclusive<f64> = 0.0..=0.2;
pub const MIN_CHEAP_PLAYERS_RANGE: RangeInclusive<u32> = 1..=8;
pub const BENCH_PENALTY_RANGE: RangeInclusive<f64> = 0.0..=5.0;
/// Flat cheap-player price ceiling a request may impose on every position.
pub const CHEAP_PRICE_THRESHOLD_RANGE: RangeInclusive<f64> = 3.5..=8.0;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Maximise total adjusted points.
    Balanced,
    /// Boost GK/DEF points by the defense weight.
    Defensive,
    /// Boost MID/FWD points by the offense weight.
    Offensive,
    /// Reward low ownership.
    Differential,
    /// Joint squad + lineup solve, penalising bench spend.
    CheapBench,
    /// Balanced objective plus a minimum count of cheap players.
    Enabling,
}

impl Strategy {
    pub const ALL: &'static [Strategy] = &[
        Strategy::Balanced,
        Strategy::Defensive,
        Strategy::Offensive,
        Strategy::Differential,
        Strategy::CheapBench,
        Strategy::Enabling,
    ];

    /// Canonical wire name, echoed back in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Balanced => "balanced",
            Strategy::Defensive => "defensive",
            Strategy::Offensive => "offensive",
            Strategy::Differential => "differential",
            Strategy::CheapBench => "cheap-bench",
            Strategy::Enabling => "enabling",
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Balanced
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parse a strategy name (case-insensitive; `-`/`_` interchangeable).
/// Accepts the legacy names `best_15` and `best_11_cheap_bench`.
impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "balanced" | "best-15" => Ok(Strategy::Balanced),
            "defensive" | "defense-weighted" => Ok(Strategy::Defensive),
            "offensive" | "offense-weighted" => Ok(Strategy::Offensive),
            "differential" => Ok(Strategy::Differential),
            "cheap-bench" | "best-11-cheap-bench" | "cost-sensitive" => Ok(Strategy::CheapBench),
            "enabling" => Ok(Strategy::Enabling),
            other => Err(anyhow::anyhow!("Unknown strategy: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Tuning values, already range-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub defense_weight: f64,
    pub offense_weight: f64,
    /// Bonus per ownership percentage point below 100.
    pub differential_factor: f64,
    pub min_cheap_players: u32,
    /// λ: cost of each unit of bench spend in the joint objective.
    pub bench_cost_penalty: f64,
    /// Replaces the configured per-position cheap thresholds when set.
    pub cheap_price_threshold: Option<Decimal>,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            defense_weight: 1.2,
            offense_weight: 1.2,
            differential_factor: 0.05,
            min_cheap_players: 4,
            bench_cost_penalty: 1.0,
            cheap_price_threshold: None,
        }
    }
}

/// Optimization request parameters as they arrive over the wire.
///
/// All fields are optional; numbers may be JSON numbers or numeric
/// strings. Legacy parameter names are accepted as aliases. Unknown keys
/// are rejected rather than ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizeRequest {
    pub strategy: Option<String>,
    #[serde(alias = "defensive_weight")]
    pub defense_weight: Option<Numeric>,
    #[serde(alias = "offensive_weight")]
    pub offense_weight: Option<Numeric>,
    pub differential_factor: Option<Numeric>,
    pub min_cheap_players: Option<Numeric>,
    #[serde(alias = "bench_cost_penalty_factor")]
    pub bench_cost_penalty: Option<Numeric>,
    #[serde(alias = "cheap_price_threshold")]
    pub cheap_player_price_threshold: Option<Numeric>,
}

impl OptimizeRequest {
    pub fn for_strategy(strategy: Strategy) -> Self {
        Self {
            strategy: Some(strategy.name().to_string()),
            ..Self::default()
        }
    }

    /// Resolve into a plan. Policy: anything present must parse and lie
    /// in range, whether or not the chosen strategy uses it; otherwise
    /// the whole request is rejected. Absent values take defaults.
    pub fn resolve(&self) -> Result<StrategyPlan, OptimizeError> {
        let strategy = match self.strategy.as_deref() {
            None => Strategy::default(),
            Some(name) if name.trim().is_empty() => Strategy::default(),
            Some(name) => name
                .parse::<Strategy>()
                .map_err(|e| OptimizeError::InvalidInput(e.to_string()))?,
        };

        let defaults = StrategyParams::default();
        let params = StrategyParams {
            defense_weight: ranged_f64(
                self.defense_weight.as_ref(),
                "defense_weight",
                &WEIGHT_RANGE,
                defaults.defense_weight,
            )?,
            offense_weight: ranged_f64(
                self.offense_weight.as_ref(),
                "offense_weight",
                &WEIGHT_RANGE,
                defaults.offense_weight,
            )?,
            differential_factor: ranged_f64(
                self.differential_factor.as_ref(),
                "differential_factor",
                &DIFFERENTIAL_FACTOR_RANGE,
                defaults.differential_factor,
            )?,
            min_cheap_players: ranged_count(
                self.min_cheap_players.as_ref(),
                "min_cheap_players",
                &MIN_CHEAP_PLAYERS_RANGE,
                defaults.min_cheap_players,
            )?,
            bench_cost_penalty: ranged_f64(
                self.bench_cost_penalty.as_ref(),
                "bench_cost_penalty",
                &BENCH_PENALTY_RANGE,
                defaults.bench_cost_penalty,
            )?,
            cheap_price_threshold: ranged_price(
                self.cheap_player_price_threshold.as_ref(),
                "cheap_player_price_threshold",
                &CHEAP_PRICE_THRESHOLD_RANGE,
            )?,
        };

        Ok(StrategyPlan { strategy, params })
    }
}

fn ranged_f64(
    value: Option<&Numeric>,
    field: &str,
    range: &RangeInclusive<f64>,
    default: f64,
) -> Result<f64, OptimizeError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.as_f64() {
        Some(v) if range.contains(&v) => Ok(v),
        Some(v) => Err(OptimizeError::InvalidInput(format!(
            "{field} = {v} is outside [{}, {}]",
            range.start(),
            range.end()
        ))),
        None => Err(OptimizeError::InvalidInput(format!(
            "{field} is not numeric: {raw:?}"
        ))),
    }
}

/// Optional money value; kept as an exact decimal once range-checked.
fn ranged_price(
    value: Option<&Numeric>,
    field: &str,
    range: &RangeInclusive<f64>,
) -> Result<Option<Decimal>, OptimizeError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let (approx, price) = raw
        .as_f64()
        .zip(raw.as_decimal())
        .ok_or_else(|| OptimizeError::InvalidInput(format!("{field} is not numeric: {raw:?}")))?;
    if !range.contains(&approx) {
        return Err(OptimizeError::InvalidInput(format!(
            "{field} = {approx} is outside [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(Some(price))
}

fn ranged_count(
    value: Option<&Numeric>,
    field: &str,
    range: &RangeInclusive<u32>,
    default: u32,
) -> Result<u32, OptimizeError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.as_f64() {
        Some(v) if v.fract() == 0.0 && v >= 0.0 && range.contains(&(v as u32)) => Ok(v as u32),
        Some(v) => Err(OptimizeError::InvalidInput(format!(
            "{field} = {v} is not an integer in [{}, {}]",
            range.start(),
            range.end()
        ))),
        None => Err(OptimizeError::InvalidInput(format!(
            "{field} is not numeric: {raw:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A resolved strategy with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyPlan {
    pub strategy: Strategy,
    pub params: StrategyParams,
}

impl StrategyPlan {
    pub fn new(strategy: Strategy, params: StrategyParams) -> Self {
        Self { strategy, params }
    }

    /// Squad-objective coefficient for one candidate.
    ///
    /// | strategy     | weight                                   |
    /// |--------------|------------------------------------------|
    /// | balanced     | adjusted                                 |
    /// | defensive    | adjusted × w_def for GK/DEF              |
    /// | offensive    | adjusted × w_off for MID/FWD             |
    /// | differential | adjusted + k × (100 − ownership)         |
    /// | cheap-bench  | adjusted (joint model adds the penalty)  |
    /// | enabling     | adjusted (plus the cheap quota)          |
    pub fn objective_weight(&self, position: Position, adjusted: f64, ownership_pct: f64) -> f64 {
        match self.strategy {
            Strategy::Balanced | Strategy::CheapBench | Strategy::Enabling => adjusted,
            Strategy::Defensive if position.is_defensive() => {
                adjusted * self.params.defense_weight
            }
            Strategy::Offensive if position.is_offensive() => {
                adjusted * self.params.offense_weight
            }
            Strategy::Defensive | Strategy::Offensive => adjusted,
            Strategy::Differential => {
                let ownership = ownership_pct.clamp(0.0, 100.0);
                adjusted + self.params.differential_factor * (100.0 - ownership)
            }
        }
    }

    /// Minimum cheap-player count, when the strategy imposes one.
    pub fn cheap_quota(&self) -> Option<u32> {
        match self.strategy {
            Strategy::Enabling => Some(self.params.min_cheap_players),
            _ => None,
        }
    }

    /// Whether squad and lineup are solved as one joint program.
    pub fn is_joint(&self) -> bool {
        self.strategy == Strategy::CheapBench
    }

    pub fn bench_cost_penalty(&self) -> f64 {
        self.params.bench_cost_penalty
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    fn plan(strategy: Strategy) -> StrategyPlan {
        StrategyPlan::new(strategy, StrategyParams::default())
    }

    #[test]
    fn test_strategy_from_str_with_aliases() {
        assert_eq!("balanced".parse::<Strategy>().unwrap(), Strategy::Balanced);
        assert_eq!("best_15".parse::<Strategy>().unwrap(), Strategy::Balanced);
        assert_eq!("DEFENSIVE".parse::<Strategy>().unwrap(), Strategy::Defensive);
        assert_eq!(
            "best_11_cheap_bench".parse::<Strategy>().unwrap(),
            Strategy::CheapBench
        );
        assert_eq!("cheap-bench".parse::<Strategy>().unwrap(), Strategy::CheapBench);
        assert!("moneyball".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_name_roundtrip() {
        for s in Strategy::ALL {
            assert_eq!(s.name().parse::<Strategy>().unwrap(), *s);
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let plan = OptimizeRequest::default().resolve().unwrap();
        assert_eq!(plan.strategy, Strategy::Balanced);
        assert_eq!(plan.params, StrategyParams::default());
    }

    #[test]
    fn test_resolve_accepts_numeric_strings() {
        let req = OptimizeRequest {
            strategy: Some("offensive".into()),
            offense_weight: Some("2.5".into()),
            ..Default::default()
        };
        let plan = req.resolve().unwrap();
        assert_eq!(plan.strategy, Strategy::Offensive);
        assert_eq!(plan.params.offense_weight, 2.5);
    }

    #[test]
    fn test_resolve_rejects_out_of_range_uniformly() {
        let cases = [
            OptimizeRequest { defense_weight: Some(3.5.into()), ..Default::default() },
            OptimizeRequest { differential_factor: Some((-0.1).into()), ..Default::default() },
            OptimizeRequest { min_cheap_players: Some(9.0.into()), ..Default::default() },
            OptimizeRequest { min_cheap_players: Some(2.5.into()), ..Default::default() },
            OptimizeRequest { bench_cost_penalty: Some("cheap".into()), ..Default::default() },
            OptimizeRequest { cheap_player_price_threshold: Some(12.0.into()), ..Default::default() },
            OptimizeRequest { cheap_player_price_threshold: Some("free".into()), ..Default::default() },
        ];
        for req in cases {
            let err = req.resolve().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{req:?}");
        }
    }

    #[test]
    fn test_resolve_rejects_unknown_strategy() {
        let req = OptimizeRequest {
            strategy: Some("all-in".into()),
            ..Default::default()
        };
        assert_eq!(req.resolve().unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_request_deserializes_legacy_names() {
        let req: OptimizeRequest = serde_json::from_str(
            r#"{"strategy": "defensive", "defensive_weight": 1.5, "min_cheap_players": "3"}"#,
        )
        .unwrap();
        let plan = req.resolve().unwrap();
        assert_eq!(plan.params.defense_weight, 1.5);
        assert_eq!(plan.params.min_cheap_players, 3);
    }

    #[test]
    fn test_request_rejects_unknown_keys() {
        let err = serde_json::from_str::<OptimizeRequest>(
            r#"{"strategy": "enabling", "defence_weight": 9}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("defence_weight"), "{err}");

        // Legacy aliases are still known keys.
        assert!(serde_json::from_str::<OptimizeRequest>(
            r#"{"offensive_weight": 1.5, "bench_cost_penalty_factor": 2}"#
        )
        .is_ok());
    }

    #[test]
    fn test_cheap_price_threshold_override() {
        let req: OptimizeRequest = serde_json::from_str(
            r#"{"strategy": "enabling", "cheap_player_price_threshold": "6.0"}"#,
        )
        .unwrap();
        let plan = req.resolve().unwrap();
        assert_eq!(plan.params.cheap_price_threshold, Some(Decimal::new(60, 1)));
        assert_eq!(OptimizeRequest::default().resolve().unwrap().params.cheap_price_threshold, None);
    }

    #[test]
    fn test_objective_weight_table() {
        let p = plan(Strategy::Balanced);
        assert_eq!(p.objective_weight(Position::Defender, 5.0, 10.0), 5.0);

        let p = plan(Strategy::Defensive);
        assert!((p.objective_weight(Position::Goalkeeper, 5.0, 10.0) - 6.0).abs() < 1e-12);
        assert_eq!(p.objective_weight(Position::Forward, 5.0, 10.0), 5.0);

        let p = plan(Strategy::Offensive);
        assert!((p.objective_weight(Position::Midfielder, 5.0, 10.0) - 6.0).abs() < 1e-12);
        assert_eq!(p.objective_weight(Position::Defender, 5.0, 10.0), 5.0);
    }

    #[test]
    fn test_differential_prefers_low_ownership() {
        let p = plan(Strategy::Differential);
        let rare = p.objective_weight(Position::Midfielder, 5.0, 5.0);
        let popular = p.objective_weight(Position::Midfielder, 5.0, 50.0);
        assert!(rare > popular);
        assert!((rare - (5.0 + 0.05 * 95.0)).abs() < 1e-12);
    }

    #[test]
    fn test_strategy_flags() {
        assert_eq!(plan(Strategy::Enabling).cheap_quota(), Some(4));
        assert_eq!(plan(Strategy::CheapBench).cheap_quota(), None);
        assert!(plan(Strategy::CheapBench).is_joint());
        assert!(!plan(Strategy::Balanced).is_joint());
    }
}
