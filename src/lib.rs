//! Rota Scrape - page fetching over rotating Tor circuits
//!
//! Fetches web pages on behalf of clients through a fixed pool of Tor SOCKS
//! circuits, never reusing the same public address against the same domain
//! within a cooldown window.
//!
//! ## Features
//!
//! - Round-robin circuit rotation with bounded per-domain admission
//! - SQLite usage ledger that survives restarts
//! - Periodic public address refresh and ledger eviction
//! - HTML to plain text sanitization
//! - REST API (`GET /get?url=...`)

pub mod api;
pub mod circuit;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repository;
pub mod scrape;
pub mod services;

pub use config::Config;
pub use database::Database;
pub use error::{Result, ScrapeError};
pub use scrape::Scraper;
