//! The `resolve(url)` entry point used by the API layer

pub mod domain;
pub mod sanitize;

pub use domain::{domain_of, parse_target};
pub use sanitize::sanitize;

use chrono::Utc;
use tracing::{info, instrument};

use crate::circuit::{AdmissionController, FetchOrchestrator};
use crate::error::{Result, ScrapeError};
use crate::models::ScrapeResult;

/// Validates the target, admits a circuit, fetches and sanitizes
pub struct Scraper {
    admission: AdmissionController,
    orchestrator: FetchOrchestrator,
}

impl Scraper {
    pub fn new(admission: AdmissionController, orchestrator: FetchOrchestrator) -> Self {
        Self {
            admission,
            orchestrator,
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, url: Option<&str>) -> Result<ScrapeResult> {
        let raw = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ScrapeError::MissingUrl)?;

        let target = parse_target(raw)?;
        let domain = domain_of(&target)?;

        // Held until the fetch is recorded.
        let admission = self.admission.admit(&domain).await?;
        let page = self
            .orchestrator
            .fetch_through(&admission.circuit, &admission.address, &target)
            .await?;

        let content = sanitize(&page);
        info!("Sanitized {} bytes down to {}", page.len(), content.len());

        Ok(ScrapeResult {
            content,
            url: raw.to_string(),
            timestamp: Utc::now(),
        })
    }
}
