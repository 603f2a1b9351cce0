use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::acquire::AcquireOptions;
use crate::document::OutputFormat;
use crate::error::MinerError;
use crate::fetch::{BrowserOptions, FetchStrategy};
use crate::keywords::KeywordSettings;

/// Looked up in the working directory when `--settings` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = "content_miner";
pub const ENV_PREFIX: &str = "MINER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub acquire: AcquireSettings,
    pub keywords: KeywordSettings,
    pub mining: MiningSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquireSettings {
    pub data_dir: PathBuf,
    pub input: PathBuf,
    /// trafilatura-style ini with a `[DEFAULT]` section
    pub extraction_config: PathBuf,
    pub strategy: FetchStrategy,
    pub concurrency: usize,
    pub url_timeout_secs: u64,
    pub settle_ms: u64,
    pub browser_sandbox: bool,
    pub include_comments: bool,
    pub include_links: bool,
    pub format: OutputFormat,
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            input: PathBuf::from("input_urls.txt"),
            extraction_config: PathBuf::from("settings.cfg"),
            strategy: FetchStrategy::Static,
            concurrency: 1,
            url_timeout_secs: 60,
            settle_ms: 1500,
            browser_sandbox: true,
            include_comments: false,
            include_links: true,
            format: OutputFormat::Xml,
        }
    }
}

impl AcquireSettings {
    pub fn url_timeout(&self) -> Duration {
        Duration::from_secs(self.url_timeout_secs)
    }

    pub fn options(&self) -> AcquireOptions {
        AcquireOptions {
            include_comments: self.include_comments,
            include_links: self.include_links,
            concurrency: self.concurrency.max(1),
            url_timeout: self.url_timeout(),
        }
    }

    pub fn browser(&self) -> BrowserOptions {
        BrowserOptions {
            settle: Duration::from_millis(self.settle_ms),
            navigation_timeout: self.url_timeout(),
            sandbox: self.browser_sandbox,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MiningSettings {
    pub parallel: bool,
}

impl Settings {
    /// Defaults, then the settings file, then `MINER__SECTION__KEY`
    /// environment variables. An explicit `path` must exist; the default
    /// `content_miner.*` file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, MinerError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("keywords.seeds"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::EmbedderKind;

    #[test]
    fn defaults_match_the_documented_values() {
        let s = Settings::default();
        assert_eq!(s.acquire.data_dir, PathBuf::from("data"));
        assert_eq!(s.acquire.input, PathBuf::from("input_urls.txt"));
        assert_eq!(s.acquire.concurrency, 1);
        assert_eq!(s.acquire.url_timeout(), Duration::from_secs(60));
        assert_eq!(s.acquire.browser().settle, Duration::from_millis(1500));
        assert!(!s.acquire.include_comments);
        assert!(s.acquire.include_links);
        assert_eq!(s.acquire.format, OutputFormat::Xml);
        assert_eq!(s.keywords.top_n, 5);
        assert_eq!(s.keywords.diversity, 0.5);
        assert_eq!(s.keywords.seeds, vec!["meditation", "meditate"]);
        assert_eq!(s.keywords.embedder, EmbedderKind::Hashing);
        assert!(!s.mining.parallel);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner.toml");
        std::fs::write(
            &path,
            r#"
[acquire]
data_dir = "corpus"
strategy = "rendered"
format = "json"
concurrency = 4

[keywords]
top_n = 3
seeds = ["breathing"]
"#,
        )
        .unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.acquire.data_dir, PathBuf::from("corpus"));
        assert_eq!(s.acquire.strategy, FetchStrategy::Rendered);
        assert_eq!(s.acquire.format, OutputFormat::Json);
        assert_eq!(s.acquire.concurrency, 4);
        assert_eq!(s.keywords.top_n, 3);
        assert_eq!(s.keywords.seeds, vec!["breathing"]);
        // untouched keys keep their defaults
        assert_eq!(s.acquire.url_timeout_secs, 60);
        assert_eq!(s.keywords.nr_candidates, 20);
    }

    #[test]
    fn explicit_missing_file_is_a_config_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/miner.toml"))).unwrap_err();
        assert!(matches!(err, MinerError::Config(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner.toml");
        std::fs::write(&path, "[acquire]\nstrategy = \"teleport\"\n").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(MinerError::Config(_))
        ));
    }

    #[test]
    fn options_clamp_concurrency() {
        let s = AcquireSettings {
            concurrency: 0,
            ..Default::default()
        };
        assert_eq!(s.options().concurrency, 1);
    }
}
