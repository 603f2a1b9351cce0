use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use tracing::debug;

use super::{BrowserOptions, Fetcher, RawPage};
use crate::error::MinerError;
use crate::source::SourceUrl;

const SETTLE_SLICE: Duration = Duration::from_millis(100);

/// Rendered fetch: a fresh headless Chromium per call, so no cookies or
/// storage carry over between URLs. The browser process is torn down when
/// the call returns, or at the next cancellation check once the fetch is
/// dropped (e.g. by the per-URL timeout).
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    options: BrowserOptions,
}

impl BrowserFetcher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    fn render(&self, url: &str, cancelled: &AtomicBool) -> anyhow::Result<String> {
        let launch = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(self.options.sandbox)
            .idle_browser_timeout(self.options.navigation_timeout)
            .build()
            .map_err(|e| anyhow!("invalid browser launch options: {}", e))?;

        let browser = Browser::new(launch)?;
        let context = browser.new_context()?;
        let tab = context.new_tab()?;
        tab.set_default_timeout(self.options.navigation_timeout);
        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        // client-side rendering gets a fixed window to finish
        if !settle(self.options.settle, cancelled) {
            bail!("render cancelled");
        }

        let html = tab.get_content()?;
        debug!(url, bytes = html.len(), "Captured rendered DOM");
        Ok(html)
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    fn name(&self) -> &'static str {
        "rendered"
    }

    async fn fetch(&self, url: &SourceUrl) -> Result<RawPage, MinerError> {
        let this = self.clone();
        let target = url.url().to_string();
        let fetch_error = |reason: String| MinerError::Fetch {
            url: url.to_string(),
            reason,
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel = CancelOnDrop(Arc::clone(&cancelled));

        let html = tokio::task::spawn_blocking(move || this.render(&target, &cancelled))
            .await
            .map_err(|e| fetch_error(e.to_string()))?
            .map_err(|e| fetch_error(format!("{:#}", e)))?;

        Ok(RawPage::new(html))
    }
}

/// Raises the flag when the owning fetch future goes away.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Sleep for `duration` in short slices. `false` if cancelled first.
fn settle(duration: Duration, cancelled: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SETTLE_SLICE.min(deadline - now));
    }
}
