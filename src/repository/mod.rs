pub mod ledger;

pub use ledger::{LedgerRepository, LedgerStore};
