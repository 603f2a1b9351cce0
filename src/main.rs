mod acquire;
mod document;
mod error;
mod extract;
mod fetch;
mod keywords;
mod mining;
mod settings;
mod source;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use acquire::{AcquireReport, AcquisitionPipeline, UrlOutcome};
use document::OutputFormat;
use extract::Extractor;
use fetch::FetchStrategy;
use keywords::{EmbedderKind, KeywordModel, ModelBuilder};
use mining::{ExtractionPipeline, MiningReport};
use settings::Settings;
use source::SourceUrl;
use store::ContentStore;

#[derive(Parser)]
#[command(
    name = "content_miner",
    about = "Scrape main content from web pages and mine it for keywords"
)]
struct Cli {
    /// Settings file (toml/json/yaml); defaults to ./content_miner.* if present
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Directory holding the stored documents
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every listed URL not yet stored and save its main content
    Scrape(ScrapeArgs),
    /// Extract keywords from every stored document
    Keywords(KeywordArgs),
    /// Scrape, then mine keywords over the whole corpus
    Run {
        #[command(flatten)]
        scrape: ScrapeArgs,
        #[command(flatten)]
        keywords: KeywordArgs,
    },
    /// Show corpus statistics
    Stats,
}

#[derive(Args)]
struct ScrapeArgs {
    /// Newline-delimited URL list
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// How pages are fetched
    #[arg(long, value_enum)]
    strategy: Option<FetchStrategy>,

    /// URLs processed at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Per-URL fetch timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Stored document format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Keep the comment section of each page
    #[arg(long)]
    comments: bool,

    /// Drop hyperlink targets from stored documents
    #[arg(long)]
    no_links: bool,

    /// Extraction config (ini with a [DEFAULT] section)
    #[arg(long)]
    extraction_config: Option<PathBuf>,
}

#[derive(Args)]
struct KeywordArgs {
    /// Keywords per document
    #[arg(short = 'n', long)]
    top_n: Option<usize>,

    /// Embedding backend
    #[arg(long, value_enum)]
    embedder: Option<EmbedderKind>,

    /// Mine documents on all cores
    #[arg(long)]
    parallel: bool,

    /// Report output
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

impl ScrapeArgs {
    fn apply(&self, settings: &mut Settings) {
        let acquire = &mut settings.acquire;
        if let Some(input) = &self.input {
            acquire.input = input.clone();
        }
        if let Some(strategy) = self.strategy {
            acquire.strategy = strategy;
        }
        if let Some(n) = self.concurrency {
            acquire.concurrency = n;
        }
        if let Some(secs) = self.timeout {
            acquire.url_timeout_secs = secs;
        }
        if let Some(format) = self.format {
            acquire.format = format;
        }
        if self.comments {
            acquire.include_comments = true;
        }
        if self.no_links {
            acquire.include_links = false;
        }
        if let Some(path) = &self.extraction_config {
            acquire.extraction_config = path.clone();
        }
    }
}

impl KeywordArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(n) = self.top_n {
            settings.keywords.top_n = n;
        }
        if let Some(kind) = self.embedder {
            settings.keywords.embedder = kind;
        }
        if self.parallel {
            settings.mining.parallel = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings =
        Settings::load(cli.settings.as_deref()).context("Failed to load settings")?;
    if let Some(dir) = &cli.data_dir {
        settings.acquire.data_dir = dir.clone();
    }

    let result = match &cli.command {
        Commands::Scrape(args) => {
            args.apply(&mut settings);
            let report = scrape(&settings).await?;
            print_acquire(&report);
            Ok(())
        }
        Commands::Keywords(args) => {
            args.apply(&mut settings);
            let model = build_model(&settings)?;
            let report = mine(&settings, model)?;
            print_mining(&report, args.output)
        }
        Commands::Run { scrape: s, keywords: k } => {
            s.apply(&mut settings);
            k.apply(&mut settings);
            // fail on a bad model before any network work
            let model = build_model(&settings)?;

            let t_scrape = Instant::now();
            let acquired = scrape(&settings).await?;
            print_acquire(&acquired);
            println!("Scraped in {:.1}s", t_scrape.elapsed().as_secs_f64());

            let t_mine = Instant::now();
            let mined = mine(&settings, model)?;
            println!("Mined in {:.1}s\n", t_mine.elapsed().as_secs_f64());
            print_mining(&mined, k.output)
        }
        Commands::Stats => stats(&settings),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn store_for(settings: &Settings) -> Arc<ContentStore> {
    Arc::new(ContentStore::new(
        &settings.acquire.data_dir,
        settings.acquire.format,
    ))
}

async fn scrape(settings: &Settings) -> anyhow::Result<AcquireReport> {
    let acquire = &settings.acquire;
    let urls = source::read_url_list(&acquire.input)?;
    if urls.is_empty() {
        println!("No URLs in {}.", acquire.input.display());
        return Ok(AcquireReport::default());
    }

    let extractor = Extractor::from_path(&acquire.extraction_config)
        .context("Failed to load extraction config")?;
    let fetcher = fetch::build_fetcher(acquire.strategy, extractor.config(), &acquire.browser())?;

    println!(
        "Scraping {} URLs ({:?}, {} at a time)...",
        urls.len(),
        acquire.strategy,
        acquire.concurrency.max(1)
    );
    let pipeline =
        AcquisitionPipeline::new(fetcher, extractor, store_for(settings), acquire.options())
            .with_progress(true);
    Ok(pipeline.run(&urls).await)
}

fn build_model(settings: &Settings) -> anyhow::Result<Arc<KeywordModel>> {
    let model =
        ModelBuilder::build(&settings.keywords).context("Failed to initialize keyword model")?;
    Ok(Arc::new(model))
}

fn mine(settings: &Settings, model: Arc<KeywordModel>) -> anyhow::Result<MiningReport> {
    ExtractionPipeline::new(store_for(settings), model)
        .parallel(settings.mining.parallel)
        .with_progress(true)
        .run()
}

fn print_acquire(report: &AcquireReport) {
    for url in &report.urls {
        match &url.outcome {
            UrlOutcome::Rejected(e) => println!("  invalid  {}: {}", url.input, e),
            UrlOutcome::Failed { error, .. } => {
                println!("  {:<8} {}: {}", error.kind(), url.input, error)
            }
            UrlOutcome::Saved(_) | UrlOutcome::Skipped(_) => {}
        }
    }
    println!(
        "Done: {} URLs ({} saved, {} skipped, {} failed, {} invalid).",
        report.attempted(),
        report.saved(),
        report.skipped(),
        report.failed() - report.rejected(),
        report.rejected()
    );
}

fn print_mining(report: &MiningReport, output: ReportFormat) -> anyhow::Result<()> {
    for r in &report.reports {
        match output {
            ReportFormat::Text => println!("{}\n", r.render()),
            ReportFormat::Json => println!("{}", serde_json::to_string(r)?),
        }
    }
    if output == ReportFormat::Text {
        for f in &report.failures {
            println!("  {:<11} {}: {}", f.error.kind(), f.file, f.error);
        }
        println!(
            "Mined {} documents ({} reported, {} empty, {} failed).",
            report.documents,
            report.reported(),
            report.empty,
            report.failed()
        );
    }
    Ok(())
}

fn stats(settings: &Settings) -> anyhow::Result<()> {
    let store = store_for(settings);
    let docs = store
        .documents()
        .with_context(|| format!("Failed to list {}", store.root().display()))?;
    let json = docs
        .iter()
        .filter(|d| d.format == OutputFormat::Json)
        .count();

    println!("Data dir:  {}", store.root().display());
    println!(
        "Documents: {} ({} xml, {} json)",
        docs.len(),
        docs.len() - json,
        json
    );

    let input = &settings.acquire.input;
    if !input.exists() {
        return Ok(());
    }
    let urls = source::read_url_list(input)?;
    let (mut stored, mut pending, mut invalid) = (0usize, 0usize, 0usize);
    for line in &urls {
        match SourceUrl::parse(line) {
            Ok(url) if store.exists(&url) => stored += 1,
            Ok(_) => pending += 1,
            Err(_) => invalid += 1,
        }
    }
    println!("Listed:    {}", urls.len());
    println!("Stored:    {}", stored);
    println!("Pending:   {}", pending);
    println!("Invalid:   {}", invalid);
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "content_miner",
            "--data-dir",
            "corpus",
            "run",
            "--strategy",
            "rendered",
            "-j",
            "4",
            "--format",
            "json",
            "-n",
            "3",
            "--output",
            "json",
        ])
        .unwrap();

        let mut settings = Settings::default();
        let Commands::Run { scrape, keywords } = &cli.command else {
            panic!("expected run");
        };
        scrape.apply(&mut settings);
        keywords.apply(&mut settings);

        assert_eq!(cli.data_dir, Some(PathBuf::from("corpus")));
        assert_eq!(settings.acquire.strategy, FetchStrategy::Rendered);
        assert_eq!(settings.acquire.concurrency, 4);
        assert_eq!(settings.acquire.format, OutputFormat::Json);
        assert_eq!(settings.keywords.top_n, 3);
        assert!(keywords.output == ReportFormat::Json);
    }

    #[test]
    fn flags_left_out_keep_settings() {
        let cli = Cli::try_parse_from(["content_miner", "scrape"]).unwrap();
        let mut settings = Settings::default();
        let Commands::Scrape(args) = &cli.command else {
            panic!("expected scrape");
        };
        args.apply(&mut settings);
        assert!(settings.acquire.include_links);
        assert!(!settings.acquire.include_comments);
        assert_eq!(settings.acquire.concurrency, 1);
    }

    #[test]
    fn durations_format_like_a_human_would() {
        use std::time::Duration;
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
