//! Captain and vice-captain.

use super::adjuster::ScoredCandidate;
use super::bench::by_value_desc;
use super::lineup::Lineup;
use crate::types::OptimizeError;

#[derive(Debug, Clone, Copy)]
pub struct Captaincy<'a> {
    pub captain: ScoredCandidate<'a>,
    pub vice_captain: ScoredCandidate<'a>,
}

/// The two highest-valued starters, ties to the lower id.
pub fn select_captaincy<'a>(lineup: &Lineup<'a>) -> Result<Captaincy<'a>, OptimizeError> {
    let mut ranked = lineup.starters.clone();
    ranked.sort_by(by_value_desc);

    match ranked.as_slice() {
        [captain, vice_captain, ..] => Ok(Captaincy {
            captain: *captain,
            vice_captain: *vice_captain,
        }),
        _ => Err(OptimizeError::Internal(format!(
            "captaincy needs two starters, lineup has {}",
            ranked.len()
        ))),
    }
}
