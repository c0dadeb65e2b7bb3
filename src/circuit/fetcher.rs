//! Page fetching through a circuit

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use super::transport::CircuitTransport;
use crate::error::{Result, ScrapeError};
use crate::models::Circuit;

/// Fetches the full page content of a URL through one circuit
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, circuit: &Circuit, url: &Url) -> Result<String>;
}

/// Plain HTTP fetcher; follows redirects but does not execute scripts
pub struct HttpPageFetcher {
    transport: Arc<CircuitTransport>,
}

impl HttpPageFetcher {
    pub fn new(transport: Arc<CircuitTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self, circuit, url), fields(port = circuit.port(), url = %url))]
    async fn fetch(&self, circuit: &Circuit, url: &Url) -> Result<String> {
        let client = self.transport.client_for(circuit)?;
        let timeout = self.transport.timeout();

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(url, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::FetchFailed(format!(
                "{} responded with {}",
                url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(url, e, timeout))?;

        debug!("Fetched {} bytes", body.len());
        Ok(body)
    }
}

/// Client-side timeouts surface as `FetchTimeout`, everything else as `FetchFailed`
fn fetch_error(url: &Url, err: reqwest::Error, timeout: Duration) -> ScrapeError {
    if err.is_timeout() {
        ScrapeError::FetchTimeout {
            secs: timeout.as_secs(),
        }
    } else {
        ScrapeError::FetchFailed(format!("{}: {}", url, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_client_timeout_maps_to_fetch_timeout() {
        // Accepts connections and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let timeout = Duration::from_millis(100);
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .unwrap();
        let url = Url::parse(&format!("http://{}/slow", addr)).unwrap();

        let err = client.get(url.clone()).send().await.unwrap_err();
        assert!(matches!(
            fetch_error(&url, err, Duration::from_secs(30)),
            ScrapeError::FetchTimeout { secs: 30 }
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_fetch_failed() {
        // Bind then drop to get a port nothing listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let url = Url::parse(&format!("http://{}/", addr)).unwrap();

        let err = client.get(url.clone()).send().await.unwrap_err();
        assert!(matches!(
            fetch_error(&url, err, Duration::from_secs(5)),
            ScrapeError::FetchFailed(_)
        ));
    }
}
