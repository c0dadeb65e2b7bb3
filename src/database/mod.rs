//! SQLite persistence for the usage ledger

pub mod migrations;
pub mod pool;

pub use pool::Database;
