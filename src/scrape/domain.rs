//! Target URL validation and domain extraction

use url::Url;

use crate::error::{Result, ScrapeError};

/// Parse a client-supplied target, accepting only http(s) URLs with a host
pub fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ScrapeError::InvalidUrl(format!(
                "unsupported scheme: {}",
                other
            )))
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ScrapeError::InvalidUrl("URL has no host".to_string()));
    }

    Ok(url)
}

/// Hostname used as the ledger key; scheme, port, path and query are ignored
pub fn domain_of(url: &Url) -> Result<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
        .ok_or_else(|| ScrapeError::InvalidUrl(format!("URL has no host: {}", url)))
}
