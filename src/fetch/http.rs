use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::{debug, warn};

use super::{Fetcher, RawPage};
use crate::error::MinerError;
use crate::extract::ExtractionConfig;
use crate::source::SourceUrl;

const MAX_REDIRECTS: usize = 2;

/// Static fetch: one GET, no script execution. Every failure degrades to an
/// empty page so the caller sees "no content" instead of an error.
pub struct HttpFetcher {
    client: reqwest::Client,
    min_file_size: usize,
    max_file_size: usize,
}

impl HttpFetcher {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.download_timeout())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            min_file_size: config.min_file_size,
            max_file_size: config.max_file_size,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self, url: &SourceUrl) -> Result<RawPage, MinerError> {
        let response = match self.client.get(url.url().clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%url, error = %e, "Download failed");
                return Ok(RawPage::empty());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Download returned non-success status");
            return Ok(RawPage::empty());
        }
        if let Some(len) = response.content_length() {
            if len as usize > self.max_file_size {
                warn!(%url, len, "Response exceeds MAX_FILE_SIZE");
                return Ok(RawPage::empty());
            }
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(%url, error = %e, "Failed to read response body");
                return Ok(RawPage::empty());
            }
        };
        if body.len() < self.min_file_size || body.len() > self.max_file_size {
            warn!(%url, bytes = body.len(), "Response size outside configured bounds");
            return Ok(RawPage::empty());
        }

        debug!(%url, bytes = body.len(), "Downloaded page");
        Ok(RawPage::new(body))
    }
}
