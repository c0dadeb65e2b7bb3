//! Address refresh service
//!
//! Periodically re-resolves the public address of every circuit. Tor rotates
//! exit nodes on its own schedule, so the ledger key of a circuit drifts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, instrument, warn};

use crate::circuit::{AddressResolver, CircuitPool, RefreshSummary};

/// Address refresh service configuration
#[derive(Clone)]
pub struct AddressRefreshConfig {
    /// Interval between refresh rounds
    pub refresh_interval: Duration,
}

impl Default for AddressRefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Address refresh service
pub struct AddressRefreshService {
    pool: Arc<CircuitPool>,
    resolver: Arc<dyn AddressResolver>,
    config: AddressRefreshConfig,
}

impl AddressRefreshService {
    pub fn new(
        pool: Arc<CircuitPool>,
        resolver: Arc<dyn AddressResolver>,
        config: AddressRefreshConfig,
    ) -> Self {
        Self {
            pool,
            resolver,
            config,
        }
    }

    /// Run until shutdown; the first round starts immediately
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Monitoring public IPs every {}s",
            self.config.refresh_interval.as_secs()
        );

        let mut ticker = interval(self.config.refresh_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Address refresh service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One refresh round
    pub async fn refresh(&self) -> RefreshSummary {
        let summary = self.pool.refresh_all(self.resolver.as_ref()).await;

        if summary.failed > 0 {
            warn!(
                "Address refresh: {} refreshed, {} failed",
                summary.refreshed, summary.failed
            );
        } else {
            info!("Address refresh: {} refreshed", summary.refreshed);
        }

        summary
    }
}

/// Handle for managing the address refresh service
pub struct AddressRefreshHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl AddressRefreshHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for AddressRefreshHandle {
    fn default() -> Self {
        Self::new().0
    }
}
