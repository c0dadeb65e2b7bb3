//! Background services

pub mod address_refresh;
pub mod ledger_eviction;

pub use address_refresh::{AddressRefreshConfig, AddressRefreshHandle, AddressRefreshService};
pub use ledger_eviction::{LedgerEvictionConfig, LedgerEvictionHandle, LedgerEvictionService};
