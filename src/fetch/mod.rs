#[cfg(feature = "browser")]
pub mod browser;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::MinerError;
use crate::extract::ExtractionConfig;
use crate::source::SourceUrl;

/// Page HTML as returned by a fetcher. Empty means "no content".
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    html: String,
}

impl RawPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty()
    }
}

/// Turns a URL into HTML. Implementations decide how (plain HTTP, a real
/// browser, ...); callers only see this trait.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &SourceUrl) -> Result<RawPage, MinerError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Plain HTTP GET, no script execution
    #[default]
    Static,
    /// Headless Chromium, page rendered before capture
    Rendered,
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub settle: Duration,
    pub navigation_timeout: Duration,
    pub sandbox: bool,
}

pub fn build_fetcher(
    strategy: FetchStrategy,
    extraction: &ExtractionConfig,
    browser: &BrowserOptions,
) -> Result<Arc<dyn Fetcher>> {
    match strategy {
        FetchStrategy::Static => Ok(Arc::new(http::HttpFetcher::new(extraction)?)),
        #[cfg(feature = "browser")]
        FetchStrategy::Rendered => Ok(Arc::new(browser::BrowserFetcher::new(browser.clone()))),
        #[cfg(not(feature = "browser"))]
        FetchStrategy::Rendered => {
            let _ = browser;
            anyhow::bail!("rendered fetching needs the `browser` feature")
        }
    }
}
