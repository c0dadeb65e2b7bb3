//! Rota Scrape Server - Entry Point
//!
//! Starts the API server and background services with graceful shutdown support.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rota_scrape::api::ApiServer;
use rota_scrape::circuit::{
    AdmissionController, CircuitPool, CircuitTransport, FetchOrchestrator, HttpPageFetcher,
    IpEchoResolver,
};
use rota_scrape::config::LogConfig;
use rota_scrape::repository::{LedgerRepository, LedgerStore};
use rota_scrape::services::{
    AddressRefreshConfig, AddressRefreshHandle, AddressRefreshService, LedgerEvictionConfig,
    LedgerEvictionHandle, LedgerEvictionService,
};
use rota_scrape::{Config, Database, Result, Scraper};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(&config.log);

    info!("Starting Rota Scrape Server");

    // Open the ledger
    let db = Database::new(&config.database).await?;
    db.run_migrations().await?;
    let ledger: Arc<dyn LedgerStore> = Arc::new(LedgerRepository::new(db.pool().clone()));

    // Build the circuit pool and its HTTP clients
    let pool = Arc::new(CircuitPool::new(&config.circuits.host, &config.circuits.ports));
    let fetch_timeout = Duration::from_secs(config.circuits.fetch_timeout);
    let transport = Arc::new(CircuitTransport::new(
        pool.circuits().iter().map(|c| c.as_ref()),
        fetch_timeout,
    )?);
    info!(
        "Loaded {} circuits on {}",
        pool.len(),
        config.circuits.host
    );

    let resolver = Arc::new(IpEchoResolver::new(
        transport.clone(),
        config.circuits.ip_echo_url.clone(),
        Duration::from_secs(config.circuits.resolve_timeout),
    ));
    let fetcher = Arc::new(HttpPageFetcher::new(transport));

    let admission = AdmissionController::new(
        pool.clone(),
        ledger.clone(),
        config.rotation.cooldown(),
        config.rotation.max_admission_attempts,
    );
    let orchestrator = FetchOrchestrator::new(fetcher, ledger.clone(), fetch_timeout);
    let scraper = Arc::new(Scraper::new(admission, orchestrator));

    // Start address refresh
    let (refresh_handle, refresh_shutdown) = AddressRefreshHandle::new();
    let refresh_service = AddressRefreshService::new(
        pool.clone(),
        resolver,
        AddressRefreshConfig {
            refresh_interval: config.rotation.refresh_interval(),
        },
    );
    let refresh_task = tokio::spawn(async move {
        refresh_service.run(refresh_shutdown).await;
    });

    // Start ledger eviction
    let (eviction_handle, eviction_shutdown) = LedgerEvictionHandle::new();
    let eviction_service = LedgerEvictionService::new(
        ledger,
        LedgerEvictionConfig {
            cooldown: config.rotation.cooldown(),
            check_interval: config.rotation.eviction_interval(),
        },
    );
    let eviction_task = tokio::spawn(async move {
        eviction_service.run(eviction_shutdown).await;
    });

    // Start API server
    let (api_shutdown_tx, api_shutdown) = tokio::sync::watch::channel(false);
    let api_server = ApiServer::new(
        config.api.clone(),
        db.clone(),
        scraper,
        pool,
        fetch_timeout + Duration::from_secs(10),
    );
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server listening on {}", config.api_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = api_shutdown_tx.send(true);
    refresh_handle.shutdown();
    eviction_handle.shutdown();

    let _ = tokio::join!(api_task, refresh_task, eviction_task);

    db.close().await;
    info!("Rota Scrape Server stopped");
    Ok(())
}

/// Initialize tracing from `LOG_LEVEL`/`LOG_FORMAT`, with `RUST_LOG` taking precedence
fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("rota_scrape={},tower_http=debug", log.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
