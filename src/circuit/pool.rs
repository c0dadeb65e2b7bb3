//! Fixed, ordered pool of circuits

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::resolver::AddressResolver;
use crate::error::{Result, ScrapeError};
use crate::models::{Circuit, CircuitSummary};

/// Outcome of one `refresh_all` round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

/// Round-robin pool of circuits
///
/// The set of circuits is fixed at construction. The cursor is lock-free and
/// each circuit guards its own address, so refreshes of different circuits
/// never contend with each other or with selection.
pub struct CircuitPool {
    circuits: Vec<Arc<Circuit>>,
    cursor: AtomicUsize,
}

impl CircuitPool {
    pub fn new(host: &str, ports: &[u16]) -> Self {
        Self::from_circuits(ports.iter().map(|&port| Circuit::new(host, port)).collect())
    }

    pub fn from_circuits(circuits: Vec<Circuit>) -> Self {
        Self {
            circuits: circuits.into_iter().map(Arc::new).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next circuit in fixed cyclic order
    pub fn select_next(&self) -> Result<Arc<Circuit>> {
        if self.circuits.is_empty() {
            return Err(ScrapeError::NoIdentitiesAvailable);
        }

        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.circuits.len();

        self.circuits
            .get(idx)
            .cloned()
            .ok_or(ScrapeError::NoIdentitiesAvailable)
    }

    /// First circuit after `port` in pool order whose port is not in `skip`
    ///
    /// Does not move the cursor.
    pub fn next_untried_after(&self, port: u16, skip: &HashSet<u16>) -> Option<Arc<Circuit>> {
        let start = self.circuits.iter().position(|c| c.port() == port)?;
        let len = self.circuits.len();

        (1..=len)
            .map(|offset| &self.circuits[(start + offset) % len])
            .find(|c| !skip.contains(&c.port()))
            .cloned()
    }

    /// Last known public address, possibly the placeholder
    pub fn current_address(&self, circuit: &Circuit) -> String {
        circuit.address()
    }

    /// Move the cursor back to the first circuit
    pub fn reset_cursor(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    pub fn circuits(&self) -> &[Arc<Circuit>] {
        &self.circuits
    }

    pub fn snapshot(&self) -> Vec<CircuitSummary> {
        self.circuits.iter().map(|c| c.summary()).collect()
    }

    /// Re-resolve every circuit's public address concurrently
    ///
    /// A failure leaves that circuit's previous address in place.
    #[instrument(skip(self, resolver), fields(circuits = self.circuits.len()))]
    pub async fn refresh_all(&self, resolver: &dyn AddressResolver) -> RefreshSummary {
        let results = join_all(self.circuits.iter().map(|circuit| async move {
            match resolver.resolve(circuit).await {
                Ok(address) => {
                    let previous = circuit.address();
                    if previous != address {
                        info!(
                            port = circuit.port(),
                            "Public IP through port {} is {}",
                            circuit.port(),
                            address
                        );
                    } else {
                        debug!(port = circuit.port(), address = %address, "Public IP unchanged");
                    }
                    circuit.set_address(address);
                    true
                }
                Err(e) => {
                    warn!(
                        port = circuit.port(),
                        "Unable to fetch public IP through port {}: {}",
                        circuit.port(),
                        e
                    );
                    false
                }
            }
        }))
        .await;

        let refreshed = results.iter().filter(|&&ok| ok).count();
        RefreshSummary {
            refreshed,
            failed: results.len() - refreshed,
        }
    }
}
