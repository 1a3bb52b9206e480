//! FPL Optimizer — HTTP service entry point.
//!
//! Loads configuration, initialises structured logging, restores the
//! candidate pool from the last snapshot (refreshing from the provider
//! when configured), and serves the optimizer API until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use fpl_optimizer::config::AppConfig;
use fpl_optimizer::data::fpl::FplClient;
use fpl_optimizer::data::PlayerDataProvider;
use fpl_optimizer::engine::Optimizer;
use fpl_optimizer::server::{self, ServerState};
use fpl_optimizer::solver::MicroLpSolver;
use fpl_optimizer::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::path_from_env();
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    let rules = cfg.optimizer.to_rules()?;
    info!(
        config = %config_path,
        budget = %rules.budget,
        max_per_team = rules.max_per_team,
        solve_timeout_secs = rules.solve_timeout.as_secs(),
        "FPL optimizer starting up"
    );

    let optimizer = Optimizer::new(rules, Arc::new(MicroLpSolver::new()))
        .context("Failed to build optimizer")?;

    let provider: Option<Arc<dyn PlayerDataProvider>> = match cfg.data.provider.as_str() {
        "fpl" => Some(Arc::new(FplClient::new(&cfg.data)?) as Arc<dyn PlayerDataProvider>),
        "none" | "" => None,
        other => anyhow::bail!("Unknown data provider in config: {other}"),
    };

    let state = Arc::new(ServerState::new(
        Arc::new(optimizer),
        provider.clone(),
        Some(cfg.data.snapshot_path.clone()),
    ));

    bootstrap_pool(&state, provider.as_deref(), &cfg).await;

    server::serve(state, &cfg.server.host, cfg.server.port).await
}

/// Load the saved snapshot, then refresh from the provider if asked to
/// (or if there was nothing on disk). Failures leave the server up with
/// whatever pool it managed to get.
async fn bootstrap_pool(
    state: &ServerState,
    provider: Option<&dyn PlayerDataProvider>,
    cfg: &AppConfig,
) {
    let path = cfg.data.snapshot_path.as_str();
    let mut loaded = false;

    match storage::load_snapshot(Some(path)) {
        Ok(Some(snapshot)) => match state.install_snapshot(&snapshot).await {
            Ok(_) => loaded = true,
            Err(e) => warn!(path, error = %e, "Saved snapshot failed validation"),
        },
        Ok(None) => {}
        Err(e) => warn!(path, error = %e, "Could not read saved snapshot"),
    }

    let Some(provider) = provider else {
        if !loaded {
            warn!("No data provider and no snapshot; /optimize-team returns 503 until data is loaded");
        }
        return;
    };
    if loaded && !cfg.data.refresh_on_startup {
        return;
    }

    match provider.fetch_pool().await {
        Ok(snapshot) => match state.install_snapshot(&snapshot).await {
            Ok(_) => {
                if let Err(e) = storage::save_snapshot(&snapshot, Some(path)) {
                    warn!(path, error = %e, "Failed to persist snapshot");
                }
            }
            Err(e) => warn!(provider = provider.name(), error = %e, "Fetched data failed validation"),
        },
        Err(e) => warn!(provider = provider.name(), error = %e, "Startup data refresh failed"),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fpl_optimizer=info"));

    let json_logging = std::env::var("FPL_OPTIMIZER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
