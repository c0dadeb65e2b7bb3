//! Ledger eviction service
//!
//! Deletes ledger entries that have aged out of the cooldown window. Admission
//! already ignores them; this only keeps the table small.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::error::Result;
use crate::repository::LedgerStore;

/// Ledger eviction service configuration
#[derive(Clone)]
pub struct LedgerEvictionConfig {
    /// Entries older than this are removed
    pub cooldown: Duration,
    /// How often to run
    pub check_interval: Duration,
}

impl Default for LedgerEvictionConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(24 * 60 * 60),
            check_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Ledger eviction service
pub struct LedgerEvictionService {
    ledger: Arc<dyn LedgerStore>,
    config: LedgerEvictionConfig,
}

impl LedgerEvictionService {
    pub fn new(ledger: Arc<dyn LedgerStore>, config: LedgerEvictionConfig) -> Self {
        Self { ledger, config }
    }

    /// Run until shutdown; the first eviction starts immediately
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting ledger eviction service (cooldown: {}h, interval: {}s)",
            self.config.cooldown.as_secs() / 3600,
            self.config.check_interval.as_secs()
        );

        let mut ticker = interval(self.config.check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.evict(Utc::now().timestamp()).await {
                        error!("Ledger eviction failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Ledger eviction service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Remove entries older than `now - cooldown`
    pub async fn evict(&self, now: i64) -> Result<u64> {
        let cooldown = i64::try_from(self.config.cooldown.as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(cooldown);
        let deleted = self.ledger.evict_older_than(cutoff).await?;

        if deleted > 0 {
            info!("Evicted {} ledger entries older than {}", deleted, cutoff);
        } else {
            debug!("No expired ledger entries");
        }

        Ok(deleted)
    }
}

/// Handle for managing the ledger eviction service
pub struct LedgerEvictionHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl LedgerEvictionHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for LedgerEvictionHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::error::ScrapeError;
    use crate::repository::LedgerRepository;
    use async_trait::async_trait;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 24 * 60 * 60;

    struct BrokenLedger;

    #[async_trait]
    impl LedgerStore for BrokenLedger {
        async fn record_use(&self, _: &str, _: &str, _: i64) -> Result<()> {
            Ok(())
        }

        async fn last_use_within_window(&self, _: &str, _: &str, _: i64) -> Result<Option<i64>> {
            Ok(None)
        }

        async fn evict_older_than(&self, _: i64) -> Result<u64> {
            Err(ScrapeError::Internal("locked".to_string()))
        }
    }

    #[test]
    fn test_config_default() {
        let config = LedgerEvictionConfig::default();
        assert_eq!(config.cooldown, Duration::from_secs(86_400));
        assert_eq!(config.check_interval, Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_evict_keeps_entries_inside_window() {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let ledger = Arc::new(LedgerRepository::new(db.pool().clone()));

        ledger.record_use("1.1.1.1", "example.com", NOW - DAY - 1).await.unwrap();
        ledger.record_use("1.1.1.1", "example.com", NOW - DAY).await.unwrap();
        ledger.record_use("1.1.1.1", "example.com", NOW - 10).await.unwrap();

        let service = LedgerEvictionService::new(ledger.clone(), LedgerEvictionConfig::default());
        assert_eq!(service.evict(NOW).await.unwrap(), 1);
        assert_eq!(service.evict(NOW).await.unwrap(), 0);
        assert_eq!(ledger.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_evict_with_huge_cooldown_keeps_everything() {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let ledger = Arc::new(LedgerRepository::new(db.pool().clone()));
        ledger.record_use("1.1.1.1", "example.com", 0).await.unwrap();

        let service = LedgerEvictionService::new(
            ledger.clone(),
            LedgerEvictionConfig {
                cooldown: Duration::from_secs(u64::MAX),
                check_interval: Duration::from_secs(60),
            },
        );

        assert_eq!(service.evict(NOW).await.unwrap(), 0);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_survives_failed_cycle() {
        let service = LedgerEvictionService::new(
            Arc::new(BrokenLedger),
            LedgerEvictionConfig {
                cooldown: Duration::from_secs(60),
                check_interval: Duration::from_millis(20),
            },
        );

        let (handle, shutdown) = LedgerEvictionHandle::new();
        let task = tokio::spawn(async move { service.run(shutdown).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("service did not stop")
            .unwrap();
    }
}
