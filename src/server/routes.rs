//! HTTP route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ServerState>`.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::data::PlayerDataProvider;
use crate::engine::report::OptimizationReport;
use crate::engine::Optimizer;
use crate::storage;
use crate::strategy::OptimizeRequest;
use crate::types::{CandidatePool, ErrorKind, OptimizeError, PoolSnapshot};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Where the current pool came from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub candidates: usize,
    pub teams: usize,
}

/// Shared state accessible by all route handlers.
pub struct ServerState {
    pub optimizer: Arc<Optimizer>,
    pool: RwLock<Option<(Arc<CandidatePool>, PoolInfo)>>,
    provider: Option<Arc<dyn PlayerDataProvider>>,
    snapshot_path: Option<String>,
}

impl ServerState {
    pub fn new(
        optimizer: Arc<Optimizer>,
        provider: Option<Arc<dyn PlayerDataProvider>>,
        snapshot_path: Option<String>,
    ) -> Self {
        Self {
            optimizer,
            pool: RwLock::new(None),
            provider,
            snapshot_path,
        }
    }

    /// Validate a snapshot and make it the live pool. In-flight requests
    /// keep the pool they started with.
    pub async fn install_snapshot(&self, snapshot: &PoolSnapshot) -> Result<PoolInfo, OptimizeError> {
        let pool = snapshot.to_pool()?;
        let info = PoolInfo {
            source: snapshot.source.clone(),
            fetched_at: snapshot.fetched_at,
            candidates: pool.len(),
            teams: pool.teams().count(),
        };
        *self.pool.write().await = Some((Arc::new(pool), info.clone()));
        info!(
            source = %info.source,
            candidates = info.candidates,
            teams = info.teams,
            "Candidate pool installed"
        );
        Ok(info)
    }

    pub async fn pool(&self) -> Option<Arc<CandidatePool>> {
        self.pool.read().await.as_ref().map(|(pool, _)| Arc::clone(pool))
    }

    pub async fn pool_info(&self) -> Option<PoolInfo> {
        self.pool.read().await.as_ref().map(|(_, info)| info.clone())
    }
}

pub type AppState = Arc<ServerState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub pool: Option<PoolInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

/// HTTP status for a report.
pub fn status_for(report: &OptimizationReport) -> StatusCode {
    match report.error.as_ref().map(|e| e.kind) {
        None => StatusCode::OK,
        Some(ErrorKind::InvalidInput) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ErrorKind::InfeasibleSquad) => StatusCode::CONFLICT,
        Some(ErrorKind::SolveTimeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(ErrorKind::InfeasibleLineup) | Some(ErrorKind::Internal) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /optimize-team
pub async fn optimize_team(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<OptimizationReport>) {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        OptimizeRequest::default()
    } else {
        match serde_json::from_slice::<OptimizeRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                let err = OptimizeError::InvalidInput(format!("malformed request body: {e}"));
                let report = OptimizationReport::failure(&err, None);
                return (status_for(&report), Json(report));
            }
        }
    };

    let Some(pool) = state.pool().await else {
        let err = OptimizeError::Internal(
            "no candidate pool loaded yet; POST /update-data first".to_string(),
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(OptimizationReport::failure(&err, None)),
        );
    };

    let optimizer = Arc::clone(&state.optimizer);
    let report = match tokio::task::spawn_blocking(move || optimizer.run(&pool, &request)).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Optimization task panicked");
            let err = OptimizeError::Internal(format!("optimization task failed: {e}"));
            OptimizationReport::failure(&err, None)
        }
    };

    (status_for(&report), Json(report))
}

/// POST /update-data
pub async fn update_data(State(state): State<AppState>) -> Result<Json<PoolInfo>, ApiError> {
    let Some(provider) = state.provider.as_ref() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "no data provider configured",
        ));
    };

    let snapshot = provider.fetch_pool().await.map_err(|e| {
        warn!(provider = provider.name(), error = %e, "Data refresh failed");
        api_error(StatusCode::BAD_GATEWAY, format!("{e:#}"))
    })?;

    let info = state
        .install_snapshot(&snapshot)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e.to_string()))?;

    if let Some(path) = state.snapshot_path.as_deref() {
        // The live pool is already updated; a failed write only costs
        // the next cold start.
        if let Err(e) = storage::save_snapshot(&snapshot, Some(path)) {
            warn!(path, error = %e, "Failed to persist snapshot");
        }
    }

    Ok(Json(info))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pool: state.pool_info().await,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::report::ErrorBody;
    use crate::types::SquadInfeasibility;

    fn failed(err: OptimizeError) -> OptimizationReport {
        OptimizationReport::failure(&err, None)
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&failed(OptimizeError::InvalidInput("x".into()))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&failed(OptimizeError::InfeasibleSquad(
                SquadInfeasibility::Combined { cheap_quota: None }
            ))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&failed(OptimizeError::SolveTimeout { stage: "squad", timeout_secs: 1 })),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&failed(OptimizeError::InfeasibleLineup("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_serializes_kind() {
        let body = ErrorBody {
            kind: ErrorKind::SolveTimeout,
            reason: "slow".into(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"SolveTimeout\""));
    }
}
