use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, info_span, warn, Instrument};

use crate::error::MinerError;
use crate::extract::{ExtractOptions, Extractor};
use crate::fetch::Fetcher;
use crate::source::SourceUrl;
use crate::store::ContentStore;

#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub include_comments: bool,
    pub include_links: bool,
    pub concurrency: usize,
    pub url_timeout: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            include_comments: false,
            include_links: true,
            concurrency: 1,
            url_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A document for this URL is already stored.
    Exists,
    /// Another worker in this run holds the URL.
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Persist,
}

#[derive(Debug)]
pub enum UrlOutcome {
    Saved(PathBuf),
    Skipped(SkipReason),
    Rejected(MinerError),
    Failed { stage: Stage, error: MinerError },
}

#[derive(Debug)]
pub struct UrlReport {
    pub input: String,
    pub outcome: UrlOutcome,
}

/// Per-URL outcomes in input order.
#[derive(Debug, Default)]
pub struct AcquireReport {
    pub urls: Vec<UrlReport>,
}

impl AcquireReport {
    pub fn attempted(&self) -> usize {
        self.urls.len()
    }

    pub fn saved(&self) -> usize {
        self.count(|o| matches!(o, UrlOutcome::Saved(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UrlOutcome::Skipped(_)))
    }

    /// Failures, rejected input lines included.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UrlOutcome::Failed { .. } | UrlOutcome::Rejected(_)))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, UrlOutcome::Rejected(_)))
    }

    fn count(&self, pred: impl Fn(&UrlOutcome) -> bool) -> usize {
        self.urls.iter().filter(|u| pred(&u.outcome)).count()
    }
}

/// URL list → stored documents. Each URL is handled end to end by one
/// worker; at most `concurrency` run at once.
#[derive(Clone)]
pub struct AcquisitionPipeline {
    fetcher: Arc<dyn Fetcher>,
    extractor: Extractor,
    store: Arc<ContentStore>,
    extract: ExtractOptions,
    concurrency: usize,
    url_timeout: Duration,
    progress: bool,
}

impl AcquisitionPipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: Extractor,
        store: Arc<ContentStore>,
        options: AcquireOptions,
    ) -> Self {
        let extract = ExtractOptions {
            include_comments: options.include_comments,
            include_links: options.include_links,
            format: store.format(),
        };
        Self {
            fetcher,
            extractor,
            store,
            extract,
            concurrency: options.concurrency.max(1),
            url_timeout: options.url_timeout,
            progress: false,
        }
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub async fn run(&self, inputs: &[String]) -> AcquireReport {
        let total = inputs.len();
        let pb = self.progress_bar(total);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::channel::<(usize, UrlOutcome)>(total.max(1));

        let mut slots: Vec<Option<UrlOutcome>> = (0..total).map(|_| None).collect();

        info!(
            urls = total,
            fetcher = self.fetcher.name(),
            concurrency = self.concurrency,
            "Starting acquisition"
        );

        for (idx, input) in inputs.iter().enumerate() {
            let url = match SourceUrl::parse(input) {
                Ok(url) => url,
                Err(e) => {
                    warn!(input = %input, error = %e, "Rejected input line");
                    slots[idx] = Some(UrlOutcome::Rejected(e));
                    pb.inc(1);
                    continue;
                }
            };

            // Permits are taken here, in input order, so a sequential run
            // processes URLs exactly as listed.
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let worker = self.clone();
            let tx = tx.clone();
            let pb = pb.clone();

            tokio::spawn(async move {
                let span = info_span!("url", url = %url);
                let outcome = worker.process(&url).instrument(span).await;
                drop(permit);
                log_outcome(&url, &outcome);
                pb.inc(1);
                let _ = tx.send((idx, outcome)).await;
            });
        }

        drop(tx);

        while let Some((idx, outcome)) = rx.recv().await {
            slots[idx] = Some(outcome);
        }
        pb.finish_and_clear();

        let urls = inputs
            .iter()
            .zip(slots)
            .map(|(input, slot)| UrlReport {
                input: input.clone(),
                outcome: slot.unwrap_or_else(|| UrlOutcome::Failed {
                    stage: Stage::Fetch,
                    error: MinerError::Fetch {
                        url: input.clone(),
                        reason: "worker task aborted".into(),
                    },
                }),
            })
            .collect();

        let report = AcquireReport { urls };
        info!(
            "Acquired {} URLs ({} saved, {} skipped, {} failed)",
            report.attempted(),
            report.saved(),
            report.skipped(),
            report.failed()
        );
        report
    }

    async fn process(&self, url: &SourceUrl) -> UrlOutcome {
        if self.store.exists(url) {
            return UrlOutcome::Skipped(SkipReason::Exists);
        }
        let Some(_claim) = self.store.claim(url) else {
            return UrlOutcome::Skipped(SkipReason::InFlight);
        };
        // a worker that held the claim may have saved before releasing it
        if self.store.exists(url) {
            return UrlOutcome::Skipped(SkipReason::Exists);
        }

        let page = match tokio::time::timeout(self.url_timeout, self.fetcher.fetch(url)).await {
            Ok(Ok(page)) => page,
            Ok(Err(error)) => {
                return UrlOutcome::Failed {
                    stage: Stage::Fetch,
                    error,
                }
            }
            Err(_) => {
                return UrlOutcome::Failed {
                    stage: Stage::Fetch,
                    error: MinerError::Fetch {
                        url: url.to_string(),
                        reason: format!("timed out after {}s", self.url_timeout.as_secs_f64()),
                    },
                }
            }
        };
        if page.is_empty() {
            return UrlOutcome::Failed {
                stage: Stage::Fetch,
                error: MinerError::NoContent(url.to_string()),
            };
        }

        let Some(doc) = self.extractor.extract(&page, url, &self.extract) else {
            return UrlOutcome::Failed {
                stage: Stage::Extract,
                error: MinerError::NoContent(url.to_string()),
            };
        };

        match self.store.save(&doc, url) {
            Ok(path) => UrlOutcome::Saved(path),
            Err(error) => UrlOutcome::Failed {
                stage: Stage::Persist,
                error,
            },
        }
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

fn log_outcome(url: &SourceUrl, outcome: &UrlOutcome) {
    match outcome {
        UrlOutcome::Saved(path) => info!(%url, path = %path.display(), "Saved"),
        UrlOutcome::Skipped(reason) => info!(%url, ?reason, "Skipped"),
        UrlOutcome::Rejected(error) => warn!(%url, %error, "Rejected"),
        UrlOutcome::Failed { stage, error } => {
            warn!(%url, ?stage, kind = error.kind(), %error, "Failed")
        }
    }
}
