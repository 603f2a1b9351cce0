pub mod config;
mod content;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use scraper::Html;
use tracing::debug;

use crate::document::{Block, DocumentMeta, OutputFormat, StructuredDocument};
use crate::error::MinerError;
use crate::fetch::RawPage;
use crate::source::SourceUrl;
pub use config::ExtractionConfig;
use content::{Walker, COMMENT_SELECTORS, ROOT_SELECTORS};

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub include_comments: bool,
    pub include_links: bool,
    pub format: OutputFormat,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_comments: false,
            include_links: true,
            format: OutputFormat::Xml,
        }
    }
}

/// Boilerplate remover. Holds the run's extraction config; cheap to share.
#[derive(Debug, Clone)]
pub struct Extractor {
    config: Arc<ExtractionConfig>,
}

impl Extractor {
    pub fn new(config: Arc<ExtractionConfig>) -> Self {
        Self { config }
    }

    pub fn from_path(path: &Path) -> Result<Self, MinerError> {
        Ok(Self::new(Arc::new(ExtractionConfig::load(path)?)))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Main content of `page` as a structured document, or `None` when the
    /// page is empty or has nothing worth keeping.
    pub fn extract(
        &self,
        page: &RawPage,
        url: &SourceUrl,
        options: &ExtractOptions,
    ) -> Option<StructuredDocument> {
        if page.is_empty() {
            return None;
        }

        let cfg = &*self.config;
        let html = Html::parse_document(page.html());
        let base = url.url();

        let mut main = None;
        for selector in ROOT_SELECTORS {
            let Some(root) = content::select_first(&html, selector) else {
                continue;
            };
            let walker = Walker::new(base, options.include_links);
            if content::inside_boilerplate(&walker, root) {
                continue;
            }
            let blocks = walker.walk(root);
            if content::text_len(&blocks) >= cfg.min_extracted_size {
                debug!(%url, selector, "Content root found");
                main = Some(blocks);
                break;
            }
        }
        let main = main.unwrap_or_else(|| {
            debug!(%url, "No content root reached the size threshold, walking <body>");
            content::select_first(&html, "body")
                .map(|body| {
                    Walker::new(base, options.include_links)
                        .skipping_headers()
                        .walk(body)
                })
                .unwrap_or_default()
        });

        let main = drop_repeated(main, cfg);
        let len = content::text_len(&main);
        if main.is_empty() || len < cfg.min_output_size {
            debug!(%url, len, "Extracted text below MIN_OUTPUT_SIZE");
            return None;
        }

        let comments = if options.include_comments {
            self.comments(&html, url, options)
        } else {
            Vec::new()
        };

        let page_meta = content::page_meta(&html);
        Some(StructuredDocument {
            meta: DocumentMeta {
                source: url.as_str().to_string(),
                hostname: url.host().to_string(),
                title: page_meta.title,
                sitename: page_meta.sitename,
                description: page_meta.description,
                language: page_meta.language,
                fetched: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                format: options.format,
            },
            main,
            comments,
        })
    }

    fn comments(&self, html: &Html, url: &SourceUrl, options: &ExtractOptions) -> Vec<Block> {
        let cfg = &*self.config;
        for selector in COMMENT_SELECTORS {
            let Some(root) = content::select_first(html, selector) else {
                continue;
            };
            let blocks: Vec<Block> = Walker::new(url.url(), options.include_links)
                .for_comments()
                .walk(root)
                .into_iter()
                .filter(|b| b.text().chars().count() >= cfg.min_extracted_comm_size)
                .collect();
            if !blocks.is_empty() && content::text_len(&blocks) >= cfg.min_output_comm_size {
                return blocks;
            }
        }
        Vec::new()
    }
}

/// Drop long blocks repeated more than `max_repetitions` times (sticky
/// banners, repeated call-outs).
fn drop_repeated(blocks: Vec<Block>, cfg: &ExtractionConfig) -> Vec<Block> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    blocks
        .into_iter()
        .filter(|b| {
            let text = b.text();
            if text.chars().count() < cfg.min_duplcheck_size {
                return true;
            }
            let count = seen.entry(text).or_insert(0);
            *count += 1;
            *count <= cfg.max_repetitions.max(1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Inline;

    fn extractor() -> Extractor {
        Extractor::new(Arc::new(ExtractionConfig::default()))
    }

    fn url() -> SourceUrl {
        SourceUrl::parse("https://example.com/blog/mindful-mornings").unwrap()
    }

    fn fixture(name: &str) -> RawPage {
        RawPage::new(std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap())
    }

    fn all_text(doc: &StructuredDocument) -> String {
        doc.main.iter().map(Block::text).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn empty_page_short_circuits() {
        let doc = extractor().extract(&RawPage::new(""), &url(), &ExtractOptions::default());
        assert!(doc.is_none());
    }

    #[test]
    fn article_keeps_content_and_drops_chrome() {
        let doc = extractor()
            .extract(&fixture("article"), &url(), &ExtractOptions::default())
            .unwrap();
        let text = all_text(&doc);

        assert!(text.contains("Meditation is the practice of training attention"));
        assert!(text.contains("breathing exercises"));
        assert!(!text.contains("Subscribe to our newsletter"));
        assert!(!text.contains("All rights reserved"));
        assert!(!text.contains("Share on"));
        assert!(!text.contains("trackPageView"));
        assert!(!text.contains("Great article"), "comments leaked into main");

        assert_eq!(doc.meta.title.as_deref(), Some("Mindful Mornings: A Beginner's Guide"));
        assert_eq!(doc.meta.sitename.as_deref(), Some("Calm Pages"));
        assert_eq!(doc.meta.language.as_deref(), Some("en"));
        assert_eq!(doc.meta.hostname, "example.com");
        assert_eq!(doc.meta.source, "https://example.com/blog/mindful-mornings");
        assert!(doc.main.iter().any(|b| matches!(b, Block::Head { .. })));
        assert!(doc.main.iter().any(|b| matches!(b, Block::List { .. })));
        assert!(doc.comments.is_empty());
        assert!(doc.paragraphs().len() >= 4);
    }

    #[test]
    fn links_follow_the_option() {
        let has_link = |doc: &StructuredDocument| {
            doc.main.iter().any(|b| match b {
                Block::Paragraph { content } => {
                    content.iter().any(|i| matches!(i, Inline::Link { .. }))
                }
                _ => false,
            })
        };

        let with = extractor()
            .extract(&fixture("article"), &url(), &ExtractOptions::default())
            .unwrap();
        assert!(has_link(&with));

        let options = ExtractOptions {
            include_links: false,
            ..Default::default()
        };
        let without = extractor().extract(&fixture("article"), &url(), &options).unwrap();
        assert!(!has_link(&without));
        assert_eq!(with.paragraphs(), without.paragraphs());
    }

    #[test]
    fn comments_follow_the_option() {
        let options = ExtractOptions {
            include_comments: true,
            ..Default::default()
        };
        let doc = extractor().extract(&fixture("article"), &url(), &options).unwrap();
        let comments: Vec<String> = doc.comments.iter().map(Block::text).collect();
        assert!(comments.iter().any(|c| c.contains("Great article")));
        assert!(!all_text(&doc).contains("Great article"));
    }

    #[test]
    fn script_shell_has_no_content() {
        let doc = extractor().extract(&fixture("app_shell"), &url(), &ExtractOptions::default());
        assert!(doc.is_none());
    }

    #[test]
    fn falls_back_to_body() {
        let page = RawPage::new(
            "<html><body><header>Site</header><div>Short note without any article markup.</div></body></html>",
        );
        let doc = extractor().extract(&page, &url(), &ExtractOptions::default()).unwrap();
        assert_eq!(doc.paragraphs(), vec!["Short note without any article markup."]);
    }

    #[test]
    fn output_size_threshold_applies() {
        let cfg = ExtractionConfig {
            min_output_size: 10_000,
            ..Default::default()
        };
        let doc = Extractor::new(Arc::new(cfg)).extract(
            &fixture("article"),
            &url(),
            &ExtractOptions::default(),
        );
        assert!(doc.is_none());
    }

    #[test]
    fn repeated_long_blocks_are_dropped() {
        let long = "This promotional paragraph repeats itself across the whole page and should only survive a couple of times in the output.";
        let body = format!("<html><body>{}</body></html>", format!("<p>{}</p>", long).repeat(5));
        let doc = extractor()
            .extract(&RawPage::new(body), &url(), &ExtractOptions::default())
            .unwrap();
        assert_eq!(doc.paragraphs().len(), 2);
    }

    #[test]
    fn format_tag_is_recorded() {
        let options = ExtractOptions {
            format: OutputFormat::Json,
            ..Default::default()
        };
        let doc = extractor().extract(&fixture("article"), &url(), &options).unwrap();
        assert_eq!(doc.meta.format, OutputFormat::Json);
    }
}
