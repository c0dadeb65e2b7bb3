use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::LedgerEntry;

/// Durable record of which public address fetched which domain, and when
///
/// Timestamps are seconds since the Unix epoch.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one use. Once this returns `Ok` the entry is durable.
    async fn record_use(&self, address: &str, domain: &str, used_at: i64) -> Result<()>;

    /// Most recent use of `address` on `domain` at or after `window_start`
    async fn last_use_within_window(
        &self,
        address: &str,
        domain: &str,
        window_start: i64,
    ) -> Result<Option<i64>>;

    /// Delete every entry strictly older than `cutoff`, returning how many went
    async fn evict_older_than(&self, cutoff: i64) -> Result<u64>;
}

/// SQLite-backed ledger
#[derive(Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All entries for a domain, newest first
    pub async fn list_for_domain(&self, domain: &str) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, address, domain, used_at
            FROM ledger
            WHERE domain = ?
            ORDER BY used_at DESC, id DESC
            "#,
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Total number of stored entries
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ledger")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    async fn record_use(&self, address: &str, domain: &str, used_at: i64) -> Result<()> {
        sqlx::query("INSERT INTO ledger (address, domain, used_at) VALUES (?, ?, ?)")
            .bind(address)
            .bind(domain)
            .bind(used_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn last_use_within_window(
        &self,
        address: &str,
        domain: &str,
        window_start: i64,
    ) -> Result<Option<i64>> {
        let latest = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            SELECT MAX(used_at)
            FROM ledger
            WHERE address = ? AND domain = ? AND used_at >= ?
            "#,
        )
        .bind(address)
        .bind(domain)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    async fn evict_older_than(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ledger WHERE used_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
