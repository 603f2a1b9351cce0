use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::document::parse::{DocumentParser, ParsedDocument};
use crate::error::MinerError;
use crate::keywords::{KeywordCandidate, KeywordModel};
use crate::store::{ContentStore, StoredDocument};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordReport {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub keywords: Vec<KeywordCandidate>,
}

impl KeywordReport {
    /// `File: <name>` / `Extracted Keywords:` block, one indented line per
    /// keyword.
    pub fn render(&self) -> String {
        let mut out = format!("File: {}", self.file);
        if let Some(source) = &self.source {
            out.push_str(&format!("\nSource: {}", source));
        }
        out.push_str("\nExtracted Keywords:");
        for kw in &self.keywords {
            out.push_str(&format!("\n  {}: {:.4}", kw.phrase, kw.score));
        }
        out
    }
}

#[derive(Debug)]
pub enum DocOutcome {
    Reported(KeywordReport),
    /// Parsed fine but had no paragraph text.
    Empty,
    Failed(MinerError),
}

#[derive(Debug)]
pub struct DocFailure {
    pub file: String,
    pub error: MinerError,
}

/// Reports and failures in corpus order plus per-outcome counts.
#[derive(Debug, Default)]
pub struct MiningReport {
    pub reports: Vec<KeywordReport>,
    pub failures: Vec<DocFailure>,
    pub documents: usize,
    pub empty: usize,
}

impl MiningReport {
    pub fn reported(&self) -> usize {
        self.reports.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Stored documents → keyword reports. A bad document is logged and skipped.
pub struct ExtractionPipeline {
    store: Arc<ContentStore>,
    model: Arc<KeywordModel>,
    parallel: bool,
    progress: bool,
}

impl ExtractionPipeline {
    pub fn new(store: Arc<ContentStore>, model: Arc<KeywordModel>) -> Self {
        Self {
            store,
            model,
            parallel: false,
            progress: false,
        }
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Mine every stored document. Only an unreadable data root is an error.
    pub fn run(&self) -> Result<MiningReport> {
        let docs = self.store.documents().with_context(|| {
            format!("Failed to list documents in {}", self.store.root().display())
        })?;
        info!(documents = docs.len(), parallel = self.parallel, "Mining keywords");

        let pb = self.progress_bar(docs.len());
        let step = |doc: &StoredDocument| {
            let outcome = self.process(doc);
            pb.inc(1);
            outcome
        };
        let outcomes: Vec<DocOutcome> = if self.parallel {
            docs.par_iter().map(step).collect()
        } else {
            docs.iter().map(step).collect()
        };
        pb.finish_and_clear();

        let mut report = MiningReport {
            documents: docs.len(),
            ..Default::default()
        };
        for (doc, outcome) in docs.iter().zip(outcomes) {
            match outcome {
                DocOutcome::Reported(r) => report.reports.push(r),
                DocOutcome::Empty => report.empty += 1,
                DocOutcome::Failed(error) => report.failures.push(DocFailure {
                    file: doc.name.clone(),
                    error,
                }),
            }
        }

        info!(
            "Mined {} documents ({} reported, {} empty, {} failed)",
            report.documents,
            report.reported(),
            report.empty,
            report.failed()
        );
        Ok(report)
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    pub fn process(&self, doc: &StoredDocument) -> DocOutcome {
        let _span = info_span!("document", file = %doc.name).entered();

        let raw = match fs::read_to_string(&doc.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read document");
                return DocOutcome::Failed(MinerError::Parse(format!(
                    "unreadable {}: {}",
                    doc.path.display(),
                    e
                )));
            }
        };

        let parsed = DocumentParser::parse_document(&raw, doc.format);
        let ParsedDocument { source, text } = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Skipping malformed document");
                return DocOutcome::Failed(e);
            }
        };
        if text.is_empty() {
            debug!("Document has no paragraph text");
            return DocOutcome::Empty;
        }

        match self.model.extract_keywords(&text) {
            Ok(keywords) => {
                let report = KeywordReport {
                    file: doc.name.clone(),
                    source,
                    keywords,
                };
                info!("{}", report.render());
                DocOutcome::Reported(report)
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Keyword extraction failed");
                DocOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::acquire::{AcquireOptions, AcquisitionPipeline};
    use crate::document::OutputFormat;
    use crate::extract::{ExtractionConfig, Extractor};
    use crate::fetch::{Fetcher, RawPage};
    use crate::keywords::{KeywordSettings, ModelBuilder};
    use crate::source::SourceUrl;
    use async_trait::async_trait;

    fn model() -> Arc<KeywordModel> {
        Arc::new(ModelBuilder::build(&KeywordSettings::default()).unwrap())
    }

    fn pipeline(root: &Path) -> ExtractionPipeline {
        ExtractionPipeline::new(Arc::new(ContentStore::new(root, OutputFormat::Xml)), model())
    }

    const GOOD: &str = "<doc source=\"https://example.com/a\">\n<main>\n\
        <p>Meditation quiets the busy mind.</p>\n\
        <p>Breathing exercises support daily practice.</p>\n\
        </main>\n</doc>";

    #[test]
    fn bad_documents_are_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("content_a.xml"), GOOD).unwrap();
        fs::write(dir.path().join("content_b.xml"), "<doc><main><p>unclosed").unwrap();
        fs::write(dir.path().join("content_c.xml"), "<doc><main></main></doc>").unwrap();
        fs::write(dir.path().join("content_d.xml"), GOOD.replace("example.com/a", "example.com/d"))
            .unwrap();

        let report = pipeline(dir.path()).run().unwrap();
        assert_eq!(report.documents, 4);
        assert_eq!(report.reported(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].file, "content_b.xml");
        assert!(matches!(report.failures[0].error, MinerError::Parse(_)));
        assert_eq!(report.empty, 1);
        let files: Vec<&str> = report.reports.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, vec!["content_a.xml", "content_d.xml"]);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            fs::write(dir.path().join(format!("content_{}.xml", i)), GOOD).unwrap();
        }
        let sequential = pipeline(dir.path()).run().unwrap();
        let parallel = pipeline(dir.path()).parallel(true).run().unwrap();
        assert_eq!(sequential.reports, parallel.reports);
    }

    #[test]
    fn empty_corpus_is_not_an_error() {
        let report = pipeline(Path::new("/nonexistent/content_miner")).run().unwrap();
        assert_eq!(report.documents, 0);
        assert!(report.reports.is_empty());
    }

    #[test]
    fn render_uses_report_layout() {
        let mut report = KeywordReport {
            file: "content_example.com_a.xml".into(),
            source: None,
            keywords: vec![KeywordCandidate {
                phrase: "guided meditation".into(),
                score: 0.61234,
            }],
        };
        assert_eq!(
            report.render(),
            "File: content_example.com_a.xml\nExtracted Keywords:\n  guided meditation: 0.6123"
        );

        report.source = Some("https://example.com/a".into());
        assert!(report
            .render()
            .starts_with("File: content_example.com_a.xml\nSource: https://example.com/a\n"));
    }

    struct OnePage;

    #[async_trait]
    impl Fetcher for OnePage {
        fn name(&self) -> &'static str {
            "one-page"
        }

        async fn fetch(&self, _url: &SourceUrl) -> Result<RawPage, MinerError> {
            Ok(RawPage::new(
                "<html><body><p>Hello world.</p><p>Second paragraph.</p></body></html>",
            ))
        }
    }

    #[tokio::test]
    async fn scrape_then_mine_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContentStore::new(dir.path().join("data"), OutputFormat::Xml));
        let acquire = AcquisitionPipeline::new(
            Arc::new(OnePage),
            Extractor::new(Arc::new(ExtractionConfig::default())),
            Arc::clone(&store),
            AcquireOptions::default(),
        );

        let acquired = acquire
            .run(&["https://example.com/a".to_string(), "not a url".to_string()])
            .await;
        assert_eq!(acquired.attempted(), 2);
        assert_eq!(acquired.saved(), 1);
        assert_eq!(acquired.rejected(), 1);
        assert_eq!(acquired.failed(), 1);
        let saved = dir.path().join("data/content_example.com_a.xml");
        assert!(saved.exists());

        let raw = fs::read_to_string(&saved).unwrap();
        assert_eq!(
            DocumentParser::parse(&raw, OutputFormat::Xml).unwrap(),
            "Hello world. Second paragraph."
        );

        let mined = ExtractionPipeline::new(Arc::clone(&store), model()).run().unwrap();
        assert_eq!(mined.documents, 1);
        assert_eq!(mined.reported(), 1);
        let report = &mined.reports[0];
        assert_eq!(report.file, "content_example.com_a.xml");
        assert_eq!(report.source.as_deref(), Some("https://example.com/a"));
        assert!(!report.keywords.is_empty());
        assert!(report.keywords.len() <= 5);

        let again = acquire
            .run(&["https://example.com/a".to_string(), "not a url".to_string()])
            .await;
        assert_eq!((again.saved(), again.skipped(), again.rejected()), (0, 1, 1));
        let remined = ExtractionPipeline::new(store, model()).run().unwrap();
        assert_eq!(remined.reports, mined.reports);
    }
}
