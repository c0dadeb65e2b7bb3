//! API server implementation
//!
//! Exposes the scrape endpoint and read-only circuit status over REST.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
