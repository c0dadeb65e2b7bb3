use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Address reported for a circuit that has never been resolved
pub const PLACEHOLDER_ADDRESS: &str = "0.0.0.0";

/// Last known public address of a circuit, swapped as a unit
#[derive(Debug, Clone)]
struct AddressState {
    address: String,
    refreshed_at: Option<DateTime<Utc>>,
}

/// One outbound Tor circuit, reached through a local SOCKS port
///
/// The port never changes. The public address is replaced wholesale by the
/// refresh loop, so readers always see a complete value from either side of
/// an update.
#[derive(Debug)]
pub struct Circuit {
    host: String,
    port: u16,
    state: ArcSwap<AddressState>,
}

impl Circuit {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            state: ArcSwap::from_pointee(AddressState {
                address: PLACEHOLDER_ADDRESS.to_string(),
                refreshed_at: None,
            }),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// SOCKS5 URL with remote DNS resolution, so lookups also leave via the circuit
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}:{}", self.host, self.port)
    }

    /// Snapshot of the current public address
    pub fn address(&self) -> String {
        self.state.load().address.clone()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.load().refreshed_at
    }

    /// Whether at least one refresh has succeeded
    pub fn is_resolved(&self) -> bool {
        self.state.load().refreshed_at.is_some()
    }

    pub fn set_address(&self, address: impl Into<String>) {
        self.set_address_at(address, Utc::now());
    }

    pub fn set_address_at(&self, address: impl Into<String>, at: DateTime<Utc>) {
        self.state.store(Arc::new(AddressState {
            address: address.into(),
            refreshed_at: Some(at),
        }));
    }

    pub fn summary(&self) -> CircuitSummary {
        let state = self.state.load();
        CircuitSummary {
            port: self.port,
            address: state.address.clone(),
            last_refreshed: state.refreshed_at,
        }
    }
}

/// Circuit view returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSummary {
    pub port: u16,
    pub address: String,
    pub last_refreshed: Option<DateTime<Utc>>,
}
