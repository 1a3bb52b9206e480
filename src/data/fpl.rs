//! Fantasy Premier League provider.
//!
//! Pulls `bootstrap-static` (players, clubs, positions) and `fixtures`
//! from the public FPL API and maps them into provider records.
//!
//! API: `https://fantasy.premierleague.com/api/`
//! Auth: none. Prices arrive in tenths (`now_cost` 45 = 4.5).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PlayerDataProvider;
use crate::config::DataConfig;
use crate::types::{CandidateRecord, Numeric, PoolSnapshot, TeamRecord};

/// Status codes for players who have left the league or are on loan.
const NOT_IN_GAME: &[&str] = &["u", "n"];

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BootstrapStatic {
    pub elements: Vec<FplElement>,
    pub teams: Vec<FplTeam>,
    pub element_types: Vec<FplElementType>,
}

#[derive(Debug, Deserialize)]
pub struct FplElement {
    pub id: u32,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub second_name: String,
    #[serde(default)]
    pub web_name: String,
    pub team: u32,
    pub element_type: u32,
    pub now_cost: i64,
    #[serde(default)]
    pub ep_next: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub chance_of_playing_this_round: Option<f64>,
    #[serde(default)]
    pub selected_by_percent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FplTeam {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FplElementType {
    pub id: u32,
    pub singular_name_short: String,
}

#[derive(Debug, Deserialize)]
pub struct FplFixture {
    #[serde(default)]
    pub event: Option<u32>,
    #[serde(default)]
    pub kickoff_time: Option<DateTime<Utc>>,
    pub team_h: u32,
    pub team_a: u32,
    #[serde(default)]
    pub finished: bool,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// A club's next fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct Upcoming {
    pub opponent_id: u32,
    pub is_home: bool,
}

/// Each club's earliest unfinished fixture, by gameweek then kickoff.
/// Fixtures not yet assigned a gameweek sort last.
pub fn next_opponents(fixtures: &[FplFixture]) -> BTreeMap<u32, Upcoming> {
    let mut pending: Vec<&FplFixture> = fixtures.iter().filter(|f| !f.finished).collect();
    pending.sort_by_key(|f| (f.event.unwrap_or(u32::MAX), f.kickoff_time));

    let mut next = BTreeMap::new();
    for fixture in pending {
        next.entry(fixture.team_h).or_insert(Upcoming {
            opponent_id: fixture.team_a,
            is_home: true,
        });
        next.entry(fixture.team_a).or_insert(Upcoming {
            opponent_id: fixture.team_h,
            is_home: false,
        });
    }
    next
}

fn display_name(element: &FplElement) -> String {
    if !element.web_name.trim().is_empty() {
        return element.web_name.clone();
    }
    format!("{} {}", element.first_name, element.second_name)
        .trim()
        .to_string()
}

/// Map raw API payloads into a snapshot. Pure; no I/O.
pub fn build_snapshot(
    bootstrap: &BootstrapStatic,
    fixtures: &[FplFixture],
    fetched_at: DateTime<Utc>,
) -> PoolSnapshot {
    let positions: HashMap<u32, &str> = bootstrap
        .element_types
        .iter()
        .map(|t| (t.id, t.singular_name_short.as_str()))
        .collect();
    let team_names: HashMap<u32, &str> = bootstrap
        .teams
        .iter()
        .map(|t| (t.id, t.name.as_str()))
        .collect();
    let upcoming = next_opponents(fixtures);

    let teams = bootstrap
        .teams
        .iter()
        .map(|t| TeamRecord {
            id: Some(Numeric::from(t.id as f64)),
            name: Some(t.name.clone()),
        })
        .collect();

    let mut dropped = 0usize;
    let candidates = bootstrap
        .elements
        .iter()
        .filter(|e| {
            let keep = !NOT_IN_GAME.contains(&e.status.as_str());
            if !keep {
                dropped += 1;
            }
            keep
        })
        .map(|e| {
            let next = upcoming.get(&e.team);
            CandidateRecord {
                id: Some(Numeric::from(e.id as f64)),
                name: Some(display_name(e)),
                team: Some(Numeric::from(e.team as f64)),
                // Unknown type ids pass through and fail validation later.
                position: Some(
                    positions
                        .get(&e.element_type)
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| e.element_type.to_string()),
                ),
                price: Some(Numeric::Text(Decimal::new(e.now_cost, 1).to_string())),
                expected_points: e.ep_next.as_deref().map(Numeric::from),
                status: Some(e.status.clone()).filter(|s| !s.is_empty()),
                chance_of_playing: e.chance_of_playing_this_round.map(Numeric::from),
                ownership_pct: e.selected_by_percent.as_deref().map(Numeric::from),
                next_opponent: next.and_then(|u| {
                    team_names.get(&u.opponent_id).map(|name| name.to_string())
                }),
                is_home: next.map(|u| u.is_home),
            }
        })
        .collect::<Vec<_>>();

    debug!(
        kept = candidates.len(),
        dropped,
        teams = bootstrap.teams.len(),
        "FPL payload mapped"
    );

    PoolSnapshot {
        fetched_at,
        source: FplClient::NAME.to_string(),
        teams,
        candidates,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct FplClient {
    http: Client,
    bootstrap_url: String,
    fixtures_url: String,
}

impl FplClient {
    pub const NAME: &'static str = "fpl";

    pub fn new(config: &DataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("fpl-optimizer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build FPL HTTP client")?;
        Ok(Self {
            http,
            bootstrap_url: config.bootstrap_url.clone(),
            fixtures_url: config.fixtures_url.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("FPL request failed: {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(url, status = %status, "FPL API returned an error");
            anyhow::bail!("FPL API error {status} for {url}: {}", body.chars().take(200).collect::<String>());
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to parse FPL response from {url}"))
    }
}

#[async_trait]
impl PlayerDataProvider for FplClient {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_pool(&self) -> Result<PoolSnapshot> {
        let bootstrap: BootstrapStatic = self.get_json(&self.bootstrap_url).await?;
        let fixtures: Vec<FplFixture> = self.get_json(&self.fixtures_url).await?;

        let snapshot = build_snapshot(&bootstrap, &fixtures, Utc::now());
        info!(
            candidates = snapshot.candidates.len(),
            teams = snapshot.teams.len(),
            fixtures = fixtures.len(),
            "FPL data fetched"
        );
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
