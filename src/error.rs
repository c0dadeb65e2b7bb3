use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the scraper
#[derive(Error, Debug)]
pub enum ScrapeError {
    // Input errors
    #[error("URL parameter is required")]
    MissingUrl,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // Admission errors
    #[error("All our public IPs have been used within the cooldown window for {domain}")]
    AdmissionExhausted { domain: String },

    #[error("No circuits configured")]
    NoIdentitiesAvailable,

    // Fetch errors
    #[error("Unable to fetch website: {0}")]
    FetchFailed(String),

    #[error("Fetch timed out after {secs}s")]
    FetchTimeout { secs: u64 },

    // Refresh errors
    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for scraper operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

impl ScrapeError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ScrapeError::MissingUrl | ScrapeError::InvalidUrl(_) => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            ScrapeError::AdmissionExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway
            ScrapeError::FetchFailed(_) | ScrapeError::AddressResolution(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 503 Service Unavailable
            ScrapeError::NoIdentitiesAvailable | ScrapeError::DatabaseConnection(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 504 Gateway Timeout
            ScrapeError::FetchTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            ScrapeError::Database(_)
            | ScrapeError::InvalidConfig(_)
            | ScrapeError::Io(_)
            | ScrapeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::MissingUrl => "missing_input",
            ScrapeError::InvalidUrl(_) => "invalid_input",
            ScrapeError::AdmissionExhausted { .. } => "admission_exhausted",
            ScrapeError::NoIdentitiesAvailable => "no_identities",
            ScrapeError::FetchFailed(_) | ScrapeError::FetchTimeout { .. } => "fetch_failed",
            ScrapeError::AddressResolution(_) => "address_resolution",
            ScrapeError::Database(_) | ScrapeError::DatabaseConnection(_) => "store_failure",
            ScrapeError::InvalidConfig(_) => "invalid_config",
            ScrapeError::Io(_) | ScrapeError::Internal(_) => "internal",
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<url::ParseError> for ScrapeError {
    fn from(err: url::ParseError) -> Self {
        ScrapeError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::FetchFailed(err.to_string())
    }
}
