//! API server using Axum

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::circuit::CircuitPool;
use crate::config::ApiServerConfig;
use crate::database::Database;
use crate::error::{Result, ScrapeError};
use crate::scrape::Scraper;

use super::middleware::{cors_layer, RequestLogging};
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub scraper: Arc<Scraper>,
    pub pool: Arc<CircuitPool>,
    pub started_at: Instant,
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    request_timeout: Duration,
}

impl ApiServer {
    /// Create a new API server
    ///
    /// `request_timeout` should exceed the page fetch timeout so fetch errors
    /// reach the client as structured JSON.
    pub fn new(
        config: ApiServerConfig,
        db: Database,
        scraper: Arc<Scraper>,
        pool: Arc<CircuitPool>,
        request_timeout: Duration,
    ) -> Self {
        let state = AppState {
            db,
            scraper,
            pool,
            started_at: Instant::now(),
        };

        Self {
            config,
            state,
            request_timeout,
        }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        let cors = cors_layer(&self.config.cors_origins);

        routes::create_router(self.state.clone())
            .layer(axum::middleware::from_fn(RequestLogging::log_request))
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| ScrapeError::InvalidConfig(format!("invalid API address: {}", e)))?;

        let router = self.build_router();

        info!("Server is running on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| ScrapeError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
