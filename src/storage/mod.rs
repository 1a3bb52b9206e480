//! Persistence layer.
//!
//! Saves and loads the last fetched provider snapshot to/from a JSON
//! file, so the server can start without reaching the upstream API.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::PoolSnapshot;

/// Default snapshot file path.
pub const DEFAULT_SNAPSHOT_PATH: &str = "fpl_snapshot.json";

/// Save a snapshot as pretty JSON.
pub fn save_snapshot(snapshot: &PoolSnapshot, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_PATH);
    let json = serde_json::to_string_pretty(snapshot).context("Failed to serialise snapshot")?;

    std::fs::write(path, &json).with_context(|| format!("Failed to write snapshot to {path}"))?;

    debug!(
        path,
        candidates = snapshot.candidates.len(),
        fetched_at = %snapshot.fetched_at,
        "Snapshot saved"
    );
    Ok(())
}

/// Load a snapshot. Returns None if the file doesn't exist.
pub fn load_snapshot(path: Option<&str>) -> Result<Option<PoolSnapshot>> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_PATH);

    if !Path::new(path).exists() {
        info!(path, "No saved snapshot found");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read snapshot from {path}"))?;
    let snapshot: PoolSnapshot = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse snapshot from {path}"))?;

    info!(
        path,
        source = %snapshot.source,
        candidates = snapshot.candidates.len(),
        teams = snapshot.teams.len(),
        fetched_at = %snapshot.fetched_at,
        "Snapshot loaded from disk"
    );
    Ok(Some(snapshot))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
