//! Fetch through an admitted circuit and record the use

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use url::Url;

use super::fetcher::PageFetcher;
use crate::error::{Result, ScrapeError};
use crate::models::Circuit;
use crate::repository::LedgerStore;
use crate::scrape::domain_of;

pub struct FetchOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    ledger: Arc<dyn LedgerStore>,
    fetch_timeout: Duration,
}

impl FetchOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        ledger: Arc<dyn LedgerStore>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            ledger,
            fetch_timeout,
        }
    }

    /// Fetch `url` through `circuit`, recording the use under `address`
    ///
    /// The ledger write completes before this returns, so a request admitted
    /// afterwards sees it. A failed or timed-out fetch writes nothing.
    #[instrument(skip(self, circuit, url), fields(port = circuit.port(), url = %url))]
    pub async fn fetch_through(&self, circuit: &Circuit, address: &str, url: &Url) -> Result<String> {
        let domain = domain_of(url)?;

        info!(
            "Fetching {} using port {} public IP {}",
            url,
            circuit.port(),
            address
        );

        let content = match timeout(self.fetch_timeout, self.fetcher.fetch(circuit, url)).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                warn!("Unable to fetch website {}: {}", url, e);
                return Err(e);
            }
            Err(_) => {
                warn!("Fetch of {} timed out", url);
                return Err(ScrapeError::FetchTimeout {
                    secs: self.fetch_timeout.as_secs(),
                });
            }
        };

        let used_at = Utc::now().timestamp();
        match self.ledger.record_use(address, &domain, used_at).await {
            Ok(()) => info!("Recorded {} using {}", domain, address),
            // The fetch already happened upstream; nothing to roll back.
            Err(e) => error!("Failed to record use of {} on {}: {}", address, domain, e),
        }

        info!("Fetched {} bytes", content.len());
        Ok(content)
    }
}
