//! Health and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::api::server::AppState;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rota-scrape"
        })),
    )
}

/// Uptime, circuit readiness and ledger reachability
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let resolved = state
        .pool
        .circuits()
        .iter()
        .filter(|c| c.is_resolved())
        .count();

    let (database, db_latency_ms) = match state.db.health_check().await {
        Ok(latency) => ("ok", Some(latency.as_millis() as u64)),
        Err(e) => {
            warn!("Ledger health check failed: {}", e);
            ("unavailable", None)
        }
    };

    Json(json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "circuits": state.pool.len(),
        "circuits_resolved": resolved,
        "database": database,
        "db_latency_ms": db_latency_ms,
    }))
}
