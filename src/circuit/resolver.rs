//! Public address resolution through a circuit

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::transport::CircuitTransport;
use crate::error::{Result, ScrapeError};
use crate::models::Circuit;

/// Resolves the address a remote server sees for traffic leaving a circuit
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, circuit: &Circuit) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct EchoResponse {
    ip: String,
}

/// Asks an IP echo service (ipify-style `{"ip": "..."}`) through the circuit
pub struct IpEchoResolver {
    transport: Arc<CircuitTransport>,
    echo_url: String,
    timeout: Duration,
}

impl IpEchoResolver {
    pub fn new(transport: Arc<CircuitTransport>, echo_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            echo_url: echo_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl AddressResolver for IpEchoResolver {
    #[instrument(skip(self, circuit), fields(port = circuit.port()))]
    async fn resolve(&self, circuit: &Circuit) -> Result<String> {
        let client = self.transport.client_for(circuit)?;

        let response = client
            .get(&self.echo_url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScrapeError::AddressResolution(e.to_string()))?;

        let body: EchoResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::AddressResolution(format!("bad echo response: {}", e)))?;

        let address = parse_address(&body.ip)?;
        debug!("Resolved public address {}", address);
        Ok(address)
    }
}

/// Normalise an echoed address, rejecting anything that is not an IP
fn parse_address(raw: &str) -> Result<String> {
    raw.trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| ScrapeError::AddressResolution(format!("not an IP address: {:?}", raw)))
}
