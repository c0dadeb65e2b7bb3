//! API request handlers

pub mod circuits;
pub mod health;
pub mod scrape;
