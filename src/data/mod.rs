//! Player data providers.
//!
//! Defines the `PlayerDataProvider` trait and the Fantasy Premier League
//! implementation that fills the candidate pool.

pub mod fpl;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::PoolSnapshot;

/// Abstraction over an upstream source of player and team records.
#[async_trait]
pub trait PlayerDataProvider: Send + Sync {
    /// Short provider name, recorded on every snapshot.
    fn name(&self) -> &str;

    /// Fetch a fresh snapshot of teams and candidates.
    async fn fetch_pool(&self) -> Result<PoolSnapshot>;
}
