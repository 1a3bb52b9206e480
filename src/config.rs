//! Configuration loading from TOML.
//!
//! Reads `config.toml` (or the file named by `FPL_OPTIMIZER_CONFIG`) and
//! deserializes it into strongly-typed structs. Every section has
//! defaults, so a missing key falls back to the standard game rules.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::rules::SquadRules;

/// Env var that overrides the config file path.
pub const CONFIG_PATH_ENV: &str = "FPL_OPTIMIZER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub optimizer: OptimizerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub provider: String,
    pub bootstrap_url: String,
    pub fixtures_url: String,
    pub snapshot_path: String,
    /// Fetch fresh data at startup even when a snapshot exists.
    pub refresh_on_startup: bool,
    pub request_timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            provider: "fpl".to_string(),
            bootstrap_url: "https://fantasy.premierleague.com/api/bootstrap-static/".to_string(),
            fixtures_url: "https://fantasy.premierleague.com/api/fixtures/".to_string(),
            snapshot_path: crate::storage::DEFAULT_SNAPSHOT_PATH.to_string(),
            refresh_on_startup: true,
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OptimizerConfig {
    pub budget: f64,
    pub max_per_team: u32,
    /// Shared by every solve in one request.
    pub solve_timeout_secs: u64,
    pub cheap_thresholds: CheapThresholds,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            budget: 100.0,
            max_per_team: 3,
            solve_timeout_secs: 30,
            cheap_thresholds: CheapThresholds::default(),
        }
    }
}

/// Per-position price ceilings for the cheap-player quota.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CheapThresholds {
    #[serde(rename = "GK")]
    pub gk: f64,
    #[serde(rename = "DEF")]
    pub def: f64,
    #[serde(rename = "MID")]
    pub mid: f64,
    #[serde(rename = "FWD")]
    pub fwd: f64,
}

impl Default for CheapThresholds {
    fn default() -> Self {
        Self {
            gk: 4.0,
            def: 4.0,
            mid: 4.5,
            fwd: 4.5,
        }
    }
}

fn to_money(value: f64, field: &str) -> Result<Decimal> {
    Decimal::try_from(value)
        .map(|d| d.round_dp(2))
        .with_context(|| format!("optimizer.{field} is not a valid amount: {value}"))
}

impl OptimizerConfig {
    /// Convert into validated game rules.
    pub fn to_rules(&self) -> Result<SquadRules> {
        let t = &self.cheap_thresholds;
        let rules = SquadRules {
            budget: to_money(self.budget, "budget")?,
            max_per_team: self.max_per_team,
            cheap_thresholds: [
                to_money(t.gk, "cheap_thresholds.GK")?,
                to_money(t.def, "cheap_thresholds.DEF")?,
                to_money(t.mid, "cheap_thresholds.MID")?,
                to_money(t.fwd, "cheap_thresholds.FWD")?,
            ],
            solve_timeout: Duration::from_secs(self.solve_timeout_secs),
            ..SquadRules::default()
        };
        rules.validate().context("Invalid optimizer configuration")?;
        Ok(rules)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Config path from the environment, or `config.toml`.
    pub fn path_from_env() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_load_config() {
        // Requires config.toml in the working directory.
        let result = AppConfig::load("config.toml");
        if let Ok(cfg) = result {
            assert_eq!(cfg.server.port, 5000);
            assert_eq!(cfg.data.provider, "fpl");
            assert_eq!(cfg.optimizer.max_per_team, 3);
            assert!(cfg.optimizer.to_rules().is_ok());
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AppConfig::parse("").unwrap();
        let rules = cfg.optimizer.to_rules().unwrap();
        assert_eq!(rules, SquadRules::default());
        assert_eq!(cfg.data.snapshot_path, "fpl_snapshot.json");
    }

    #[test]
    fn test_partial_optimizer_section() {
        let cfg = AppConfig::parse(
            r#"
            [optimizer]
            budget = 95.5
            solve_timeout_secs = 5

            [optimizer.cheap_thresholds]
            MID = 5.0
            "#,
        )
        .unwrap();
        let rules = cfg.optimizer.to_rules().unwrap();
        assert_eq!(rules.budget, dec!(95.5));
        assert_eq!(rules.solve_timeout, Duration::from_secs(5));
        assert_eq!(rules.cheap_thresholds[2], dec!(5.0));
        assert_eq!(rules.cheap_thresholds[0], dec!(4.0));
    }

    #[test]
    fn test_inconsistent_rules_rejected() {
        let cfg = AppConfig::parse("[optimizer]\nmax_per_team = 0\n").unwrap();
        assert!(cfg.optimizer.to_rules().is_err());

        let cfg = AppConfig::parse("[optimizer]\nsolve_timeout_secs = 0\n").unwrap();
        assert!(cfg.optimizer.to_rules().is_err());
    }
}
