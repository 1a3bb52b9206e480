//! Shared types for the squad optimizer.
//!
//! Raw provider records (`CandidateRecord`, `TeamRecord`) are validated
//! into an immutable `CandidatePool` once, then shared read-only across
//! optimization requests. The domain error taxonomy lives here too so
//! the engine, strategy and server layers can all speak it.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Playing position. Order matters: lineups are reported GK → FWD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ];

    /// Dense index for per-position tables.
    pub fn index(&self) -> usize {
        match self {
            Position::Goalkeeper => 0,
            Position::Defender => 1,
            Position::Midfielder => 2,
            Position::Forward => 3,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }

    pub fn is_goalkeeper(&self) -> bool {
        matches!(self, Position::Goalkeeper)
    }

    /// GK and DEF.
    pub fn is_defensive(&self) -> bool {
        matches!(self, Position::Goalkeeper | Position::Defender)
    }

    /// MID and FWD.
    pub fn is_offensive(&self) -> bool {
        matches!(self, Position::Midfielder | Position::Forward)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Parse a position code (case-insensitive, accepts the provider's `GKP`).
impl FromStr for Position {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gk" | "gkp" | "goalkeeper" => Ok(Position::Goalkeeper),
            "def" | "defender" => Ok(Position::Defender),
            "mid" | "midfielder" => Ok(Position::Midfielder),
            "fwd" | "forward" => Ok(Position::Forward),
            other => Err(anyhow::anyhow!("Unknown position code: {other}")),
        }
    }
}

/// Availability status of a candidate for the next round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    Active,
    Injured,
    Suspended,
    Doubtful,
}

impl Availability {
    /// Injured and suspended players score nothing.
    pub fn is_ruled_out(&self) -> bool {
        matches!(self, Availability::Injured | Availability::Suspended)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Active => write!(f, "active"),
            Availability::Injured => write!(f, "injured"),
            Availability::Suspended => write!(f, "suspended"),
            Availability::Doubtful => write!(f, "doubtful"),
        }
    }
}

/// Parse a status code: the provider's single letters or the full word.
impl FromStr for Availability {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" | "active" | "available" => Ok(Availability::Active),
            "i" | "injured" => Ok(Availability::Injured),
            "s" | "suspended" => Ok(Availability::Suspended),
            "d" | "doubtful" => Ok(Availability::Doubtful),
            other => Err(anyhow::anyhow!("Unknown status code: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw provider records
// ---------------------------------------------------------------------------

/// A numeric field as it arrives from the provider: either a JSON number
/// or a numeric string (the upstream API ships several as strings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    /// Finite value, or `None` if the field is not parseable.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Exact decimal value. Text is parsed directly so "4.5" stays 4.5.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Numeric::Number(n) => Decimal::from_f64(*n).map(|d| d.round_dp(4)),
            Numeric::Text(s) => Decimal::from_str(s.trim()).ok(),
        }
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Numeric::Number(value)
    }
}

impl From<&str> for Numeric {
    fn from(value: &str) -> Self {
        Numeric::Text(value.to_string())
    }
}

/// Candidate record exactly as supplied by the data provider.
/// Every field is optional here; `CandidatePool::from_records` decides
/// which absences are fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRecord {
    pub id: Option<Numeric>,
    pub name: Option<String>,
    pub team: Option<Numeric>,
    pub position: Option<String>,
    pub price: Option<Numeric>,
    pub expected_points: Option<Numeric>,
    pub status: Option<String>,
    #[serde(alias = "chance_of_playing_this_round")]
    pub chance_of_playing: Option<Numeric>,
    #[serde(alias = "ownership_percentage", alias = "selected_by_percent")]
    pub ownership_pct: Option<Numeric>,
    pub next_opponent: Option<String>,
    pub is_home: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamRecord {
    pub id: Option<Numeric>,
    pub name: Option<String>,
}

/// A fetched copy of the provider's data, as persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub source: String,
    pub teams: Vec<TeamRecord>,
    pub candidates: Vec<CandidateRecord>,
}

impl PoolSnapshot {
    /// Validate the snapshot into an optimizer-ready pool.
    pub fn to_pool(&self) -> Result<CandidatePool, OptimizeError> {
        CandidatePool::from_records(&self.teams, &self.candidates)
    }
}

// ---------------------------------------------------------------------------
// Validated entities
// ---------------------------------------------------------------------------

/// Next-fixture context, carried through unchanged for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextOpponent {
    pub opponent: String,
    pub is_home: bool,
}

/// A validated player. Immutable once the pool is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: u32,
    pub name: String,
    pub team_id: u32,
    pub position: Position,
    pub price: Decimal,
    /// Raw projection for the next round; `None` when the provider has none.
    pub projected_points: Option<f64>,
    pub status: Availability,
    /// 0–100.
    pub play_probability: f64,
    /// 0–100.
    pub ownership_pct: f64,
    pub next_opponent: Option<NextOpponent>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}, £{}m, {})",
            self.id, self.name, self.position, self.price, self.status,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
}

/// The read-only candidate pool shared by all requests.
///
/// Candidates are kept sorted by id; that order is the canonical
/// tie-break order for every downstream selection step.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    candidates: Vec<Candidate>,
    teams: BTreeMap<u32, Team>,
}

impl CandidatePool {
    /// Validate raw records. Rejects missing required fields (id, name,
    /// team, position, price), unparseable numbers, unknown codes,
    /// duplicate ids and references to unknown teams.
    pub fn from_records(
        teams: &[TeamRecord],
        candidates: &[CandidateRecord],
    ) -> Result<Self, OptimizeError> {
        let mut team_map = BTreeMap::new();
        for (row, record) in teams.iter().enumerate() {
            let id = required_id(record.id.as_ref(), "team", "id", row)?;
            let name = required_text(record.name.as_ref(), "team", "name", row)?;
            if team_map.insert(id, Team { id, name }).is_some() {
                return Err(OptimizeError::InvalidInput(format!(
                    "duplicate team id {id}"
                )));
            }
        }

        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(candidates.len());
        for (row, record) in candidates.iter().enumerate() {
            let candidate = validate_candidate(record, row, &team_map)?;
            if !seen.insert(candidate.id) {
                return Err(OptimizeError::InvalidInput(format!(
                    "duplicate candidate id {}",
                    candidate.id
                )));
            }
            validated.push(candidate);
        }
        validated.sort_by_key(|c| c.id);

        Ok(Self {
            candidates: validated,
            teams: team_map,
        })
    }

    /// Candidates in ascending id order.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.values()
    }

    pub fn team(&self, id: u32) -> Option<&Team> {
        self.teams.get(&id)
    }

    /// Display name for a team id (every candidate's team is known by
    /// construction; the fallback only guards foreign ids).
    pub fn team_name(&self, id: u32) -> &str {
        self.teams.get(&id).map(|t| t.name.as_str()).unwrap_or("Unknown")
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn validate_candidate(
    record: &CandidateRecord,
    row: usize,
    teams: &BTreeMap<u32, Team>,
) -> Result<Candidate, OptimizeError> {
    let id = required_id(record.id.as_ref(), "candidate", "id", row)?;
    let name = required_text(record.name.as_ref(), "candidate", "name", row)?;
    let team_id = required_id(record.team.as_ref(), "candidate", "team", row)?;
    if !teams.contains_key(&team_id) {
        return Err(OptimizeError::InvalidInput(format!(
            "candidate {id} references unknown team {team_id}"
        )));
    }

    let position_code = required_text(record.position.as_ref(), "candidate", "position", row)?;
    let position = position_code
        .parse::<Position>()
        .map_err(|e| OptimizeError::InvalidInput(format!("candidate {id}: {e}")))?;

    let price = record
        .price
        .as_ref()
        .ok_or_else(|| missing("candidate", "price", row))?
        .as_decimal()
        .ok_or_else(|| unparseable("candidate", "price", id))?;
    if price.is_sign_negative() {
        return Err(OptimizeError::InvalidInput(format!(
            "candidate {id} has negative price {price}"
        )));
    }

    let projected_points = optional_number(record.expected_points.as_ref(), "expected_points", id)?;

    let status = match record.status.as_deref() {
        Some(code) if !code.trim().is_empty() => code
            .parse::<Availability>()
            .map_err(|e| OptimizeError::InvalidInput(format!("candidate {id}: {e}")))?,
        _ => Availability::Active,
    };

    let play_probability =
        optional_number(record.chance_of_playing.as_ref(), "chance_of_playing", id)?
            .unwrap_or(100.0);
    // Unknown ownership earns no differential bonus.
    let ownership_pct =
        optional_number(record.ownership_pct.as_ref(), "ownership_pct", id)?.unwrap_or(100.0);

    let next_opponent = record
        .next_opponent
        .as_ref()
        .filter(|o| !o.trim().is_empty())
        .map(|opponent| NextOpponent {
            opponent: opponent.clone(),
            is_home: record.is_home.unwrap_or(false),
        });

    Ok(Candidate {
        id,
        name,
        team_id,
        position,
        price,
        projected_points,
        status,
        play_probability,
        ownership_pct,
        next_opponent,
    })
}

fn missing(entity: &str, field: &str, row: usize) -> OptimizeError {
    OptimizeError::InvalidInput(format!("{entity} record {row} is missing `{field}`"))
}

fn unparseable(entity: &str, field: &str, id: u32) -> OptimizeError {
    OptimizeError::InvalidInput(format!("{entity} {id} has unparseable `{field}`"))
}

fn required_id(
    value: Option<&Numeric>,
    entity: &str,
    field: &str,
    row: usize,
) -> Result<u32, OptimizeError> {
    let raw = value.ok_or_else(|| missing(entity, field, row))?;
    match raw.as_f64() {
        Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => Ok(v as u32),
        _ => Err(OptimizeError::InvalidInput(format!(
            "{entity} record {row} has invalid `{field}`: {raw:?}"
        ))),
    }
}

fn required_text(
    value: Option<&String>,
    entity: &str,
    field: &str,
    row: usize,
) -> Result<String, OptimizeError> {
    match value.map(|s| s.trim()) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(missing(entity, field, row)),
    }
}

fn optional_number(
    value: Option<&Numeric>,
    field: &str,
    id: u32,
) -> Result<Option<f64>, OptimizeError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .as_f64()
            .map(Some)
            .ok_or_else(|| unparseable("candidate", field, id)),
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Stable error classification, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    InfeasibleSquad,
    InfeasibleLineup,
    SolveTimeout,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidInput => write!(f, "InvalidInput"),
            ErrorKind::InfeasibleSquad => write!(f, "InfeasibleSquad"),
            ErrorKind::InfeasibleLineup => write!(f, "InfeasibleLineup"),
            ErrorKind::SolveTimeout => write!(f, "SolveTimeout"),
            ErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

/// The constraint most likely responsible for an infeasible squad.
#[derive(Debug, Clone, PartialEq)]
pub enum SquadInfeasibility {
    PositionSupply {
        position: Position,
        available: usize,
        required: u32,
    },
    Budget {
        minimum_cost: Decimal,
        budget: Decimal,
    },
    CheapSupply {
        available: usize,
        required: u32,
    },
    TeamCap {
        position: Option<Position>,
        capacity: usize,
        required: u32,
        max_per_team: u32,
    },
    /// Every individual check passes but the combination has no solution.
    Combined { cheap_quota: Option<u32> },
}

impl fmt::Display for SquadInfeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SquadInfeasibility::PositionSupply {
                position,
                available,
                required,
            } => write!(
                f,
                "not enough {position} candidates: {available} available, {required} required"
            ),
            SquadInfeasibility::Budget {
                minimum_cost,
                budget,
            } => write!(
                f,
                "budget too small: the cheapest valid squad costs {minimum_cost} but the budget is {budget}"
            ),
            SquadInfeasibility::CheapSupply {
                available,
                required,
            } => write!(
                f,
                "cheap-candidate constraint unsatisfiable: {available} candidates priced at or under the cheap threshold, {required} required"
            ),
            SquadInfeasibility::TeamCap {
                position,
                capacity,
                required,
                max_per_team,
            } => {
                let scope = position.map(|p| format!("{p} ")).unwrap_or_default();
                write!(
                    f,
                    "team cap of {max_per_team} leaves room for only {capacity} {scope}selections, {required} required"
                )
            }
            SquadInfeasibility::Combined { cheap_quota } => {
                write!(f, "no squad satisfies budget, position quotas and team cap together")?;
                if let Some(k) = cheap_quota {
                    write!(f, " with at least {k} cheap candidates")?;
                }
                Ok(())
            }
        }
    }
}

/// Domain error for an optimization request.
#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Infeasible squad: {0}")]
    InfeasibleSquad(SquadInfeasibility),

    #[error("Infeasible lineup: {0}")]
    InfeasibleLineup(String),

    #[error("Solve timeout: request time limit of {timeout_secs}s ran out during the {stage} solve with no feasible solution")]
    SolveTimeout {
        stage: &'static str,
        timeout_secs: u64,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OptimizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OptimizeError::InvalidInput(_) => ErrorKind::InvalidInput,
            OptimizeError::InfeasibleSquad(_) => ErrorKind::InfeasibleSquad,
            OptimizeError::InfeasibleLineup(_) => ErrorKind::InfeasibleLineup,
            OptimizeError::SolveTimeout { .. } => ErrorKind::SolveTimeout,
            OptimizeError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Human-readable reason without the kind prefix.
    pub fn reason(&self) -> String {
        match self {
            OptimizeError::InvalidInput(msg)
            | OptimizeError::InfeasibleLineup(msg)
            | OptimizeError::Internal(msg) => msg.clone(),
            OptimizeError::InfeasibleSquad(reason) => reason.to_string(),
            OptimizeError::SolveTimeout { .. } => self.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
