//! Circuit listing

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::server::AppState;

/// Every circuit with its last known public address
pub async fn list_circuits(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.snapshot())
}
