//! HTTP text fetcher.

use super::TextFetcher;
use crate::error::{Result, SvarError};
use crate::graph_store::Body;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Fetches body text over HTTP(S), preferring inline text when present.
pub struct HttpTextFetcher {
    client: reqwest::Client,
}

impl HttpTextFetcher {
    /// Create a fetcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SvarError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn parse_link(link: &str) -> Result<Url> {
        let url = Url::parse(link)
            .map_err(|e| SvarError::TextFetch(format!("Invalid text link '{}': {}", link, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SvarError::TextFetch(format!(
                "Unsupported scheme '{}' in text link {}",
                other, link
            ))),
        }
    }
}

#[async_trait]
impl TextFetcher for HttpTextFetcher {
    #[instrument(skip(self, body), fields(body = %body.id))]
    async fn fetch(&self, body: &Body) -> Result<String> {
        if let Some(text) = body.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(text.to_string());
        }

        let link = body
            .text_link
            .as_deref()
            .ok_or_else(|| SvarError::TextFetch(format!("Body {} has no text or link", body.id)))?;
        let url = Self::parse_link(link)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SvarError::TextFetch(format!("{}: {}", link, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SvarError::TextFetch(format!("{} returned {}", link, status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SvarError::TextFetch(format!("{}: {}", link, e)))?;

        debug!("Fetched {} bytes for body {}", text.len(), body.id);
        Ok(text)
    }
}
