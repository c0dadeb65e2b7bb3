//! HTTP clients routed through circuit SOCKS ports
//!
//! One `reqwest::Client` is built per circuit at startup so connection pools
//! are never shared between circuits.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{redirect, Client, Proxy};
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::models::Circuit;

/// Browser-like user agent sent with every request
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Per-circuit HTTP clients
pub struct CircuitTransport {
    clients: HashMap<u16, Client>,
    timeout: Duration,
}

impl CircuitTransport {
    /// Build one client per circuit
    pub fn new<'a>(
        circuits: impl IntoIterator<Item = &'a Circuit>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut clients = HashMap::new();

        for circuit in circuits {
            let proxy = Proxy::all(circuit.proxy_url()).map_err(|e| {
                ScrapeError::InvalidConfig(format!(
                    "invalid SOCKS proxy {}: {}",
                    circuit.proxy_url(),
                    e
                ))
            })?;

            let client = Client::builder()
                .proxy(proxy)
                .user_agent(DEFAULT_USER_AGENT)
                .redirect(redirect::Policy::limited(10))
                .connect_timeout(timeout)
                .timeout(timeout)
                .build()
                .map_err(|e| ScrapeError::Internal(format!("failed to build HTTP client: {}", e)))?;

            debug!(port = circuit.port(), "Built client for {}", circuit.proxy_url());
            clients.insert(circuit.port(), client);
        }

        Ok(Self { clients, timeout })
    }

    /// Client bound to this circuit's SOCKS port
    pub fn client_for(&self, circuit: &Circuit) -> Result<&Client> {
        self.clients.get(&circuit.port()).ok_or_else(|| {
            ScrapeError::Internal(format!("no client for circuit port {}", circuit.port()))
        })
    }

    /// Request timeout applied by every client
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
