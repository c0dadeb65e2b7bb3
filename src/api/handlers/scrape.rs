//! Scrape endpoint

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::api::server::AppState;
use crate::error::ScrapeError;
use crate::models::ScrapeQuery;

/// `GET /get?url=...`: fetch a page through a cool circuit
pub async fn scrape(
    State(state): State<AppState>,
    Query(query): Query<ScrapeQuery>,
) -> Result<impl IntoResponse, ScrapeError> {
    let result = state.scraper.resolve(query.url.as_deref()).await?;
    Ok(Json(result))
}
