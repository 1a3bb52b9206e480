//! Bench ordering.

use std::cmp::Ordering;

use super::adjuster::ScoredCandidate;
use super::lineup::Lineup;
use super::squad::Squad;

/// Descending adjusted value, ascending id on ties.
pub(crate) fn by_value_desc(a: &ScoredCandidate<'_>, b: &ScoredCandidate<'_>) -> Ordering {
    b.adjusted_points
        .total_cmp(&a.adjusted_points)
        .then_with(|| a.id().cmp(&b.id()))
}

/// Squad minus lineup: outfield players by descending value, then the
/// goalkeeper(s) last.
pub fn rank_bench<'a>(squad: &Squad<'a>, lineup: &Lineup<'a>) -> Vec<ScoredCandidate<'a>> {
    let mut bench: Vec<ScoredCandidate<'a>> = squad
        .members
        .iter()
        .filter(|m| !lineup.contains(m.id()))
        .copied()
        .collect();

    bench.sort_by(|a, b| {
        a.position()
            .is_goalkeeper()
            .cmp(&b.position().is_goalkeeper())
            .then_with(|| by_value_desc(a, b))
    });
    bench
}
