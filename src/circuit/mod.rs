//! Circuit rotation and admission control
//!
//! This module provides:
//! - The fixed pool of Tor circuits with round-robin selection
//! - Public address resolution through each circuit
//! - Per-domain admission against the usage ledger
//! - Page fetching through an admitted circuit

pub mod admission;
pub mod fetcher;
pub mod orchestrator;
pub mod pool;
pub mod resolver;
pub mod transport;

pub use admission::{Admission, AdmissionController};
pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use orchestrator::FetchOrchestrator;
pub use pool::{CircuitPool, RefreshSummary};
pub use resolver::{AddressResolver, IpEchoResolver};
pub use transport::CircuitTransport;
