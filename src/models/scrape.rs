use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query string of `GET /get`
#[derive(Debug, Default, Deserialize)]
pub struct ScrapeQuery {
    pub url: Option<String>,
}

/// Sanitized page text returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub content: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}
