//! Score adjustment — availability-scaled projections.
//!
//! Produces a private per-request working copy (`ScoredPool`) that
//! borrows the shared pool immutably and carries the adjusted value
//! alongside each candidate, with position and team indices.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use super::RequestContext;
use crate::types::{Candidate, CandidatePool, Position};

/// Adjusted value for one candidate.
///
/// Injured or suspended → 0. Otherwise the raw projection (missing → 0)
/// scaled by play probability when that is below 100.
pub fn adjusted_points(candidate: &Candidate) -> f64 {
    if candidate.status.is_ruled_out() {
        return 0.0;
    }
    let raw = candidate.projected_points.unwrap_or(0.0);
    let probability = candidate.play_probability.clamp(0.0, 100.0);
    let adjusted = if probability < 100.0 {
        raw * probability / 100.0
    } else {
        raw
    };
    if adjusted.is_finite() {
        adjusted.max(0.0)
    } else {
        0.0
    }
}

/// A candidate paired with its adjusted value.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a Candidate,
    pub adjusted_points: f64,
}

impl<'a> ScoredCandidate<'a> {
    pub fn id(&self) -> u32 {
        self.candidate.id
    }

    pub fn position(&self) -> Position {
        self.candidate.position
    }

    pub fn team_id(&self) -> u32 {
        self.candidate.team_id
    }

    pub fn price(&self) -> Decimal {
        self.candidate.price
    }

    /// Price as a solver coefficient.
    pub fn price_f64(&self) -> f64 {
        self.candidate.price.to_f64().unwrap_or(f64::MAX)
    }
}

/// Per-request scored view of the pool, in ascending id order.
#[derive(Debug, Clone)]
pub struct ScoredPool<'a> {
    entries: Vec<ScoredCandidate<'a>>,
    by_position: [Vec<usize>; 4],
    by_team: BTreeMap<u32, Vec<usize>>,
}

impl<'a> ScoredPool<'a> {
    pub fn entries(&self) -> &[ScoredCandidate<'a>] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> ScoredCandidate<'a> {
        self.entries[index]
    }

    /// Entry indices for one position.
    pub fn by_position(&self, position: Position) -> &[usize] {
        &self.by_position[position.index()]
    }

    /// Entry indices grouped by team id.
    pub fn by_team(&self) -> &BTreeMap<u32, Vec<usize>> {
        &self.by_team
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Score every candidate in the pool. Never mutates the pool.
pub fn adjust<'a>(pool: &'a CandidatePool, ctx: &RequestContext) -> ScoredPool<'a> {
    let mut by_position: [Vec<usize>; 4] = Default::default();
    let mut by_team: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    let mut ruled_out = 0usize;

    let entries: Vec<ScoredCandidate<'a>> = pool
        .candidates()
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            by_position[candidate.position.index()].push(i);
            by_team.entry(candidate.team_id).or_default().push(i);
            if candidate.status.is_ruled_out() {
                ruled_out += 1;
            }
            ScoredCandidate {
                candidate,
                adjusted_points: adjusted_points(candidate),
            }
        })
        .collect();

    debug!(
        request_id = %ctx.request_id(),
        candidates = entries.len(),
        ruled_out,
        teams = by_team.len(),
        "Scores adjusted"
    );

    ScoredPool {
        entries,
        by_position,
        by_team,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
