use serde::Serialize;
use sqlx::FromRow;

/// One recorded use of a public address against a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub address: String,
    pub domain: String,
    /// Seconds since the Unix epoch
    pub used_at: i64,
}
