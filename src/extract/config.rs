use std::path::Path;
use std::time::Duration;

use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::MinerError;

const DEFAULT_USER_AGENT: &str = concat!("content_miner/", env!("CARGO_PKG_VERSION"));

/// Extraction thresholds, read from the `[DEFAULT]` section of a
/// trafilatura-style ini file. Loaded once per run and shared read-only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    #[serde(alias = "DOWNLOAD_TIMEOUT")]
    pub download_timeout: u64,
    #[serde(alias = "MIN_FILE_SIZE")]
    pub min_file_size: usize,
    #[serde(alias = "MAX_FILE_SIZE")]
    pub max_file_size: usize,
    #[serde(alias = "MIN_EXTRACTED_SIZE")]
    pub min_extracted_size: usize,
    #[serde(alias = "MIN_OUTPUT_SIZE")]
    pub min_output_size: usize,
    #[serde(alias = "MIN_EXTRACTED_COMM_SIZE")]
    pub min_extracted_comm_size: usize,
    #[serde(alias = "MIN_OUTPUT_COMM_SIZE")]
    pub min_output_comm_size: usize,
    #[serde(alias = "MIN_DUPLCHECK_SIZE")]
    pub min_duplcheck_size: usize,
    #[serde(alias = "MAX_REPETITIONS")]
    pub max_repetitions: usize,
    /// Newline-separated list; the first non-blank entry is used.
    #[serde(alias = "USER_AGENTS")]
    pub user_agents: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            download_timeout: 30,
            min_file_size: 10,
            max_file_size: 20_000_000,
            min_extracted_size: 250,
            min_output_size: 1,
            min_extracted_comm_size: 1,
            min_output_comm_size: 1,
            min_duplcheck_size: 100,
            max_repetitions: 2,
            user_agents: String::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IniFile {
    #[serde(default, rename = "default", alias = "DEFAULT")]
    default: ExtractionConfig,
}

impl ExtractionConfig {
    /// Load from an ini file. A missing file falls back to defaults, a file
    /// that exists but cannot be parsed is an error.
    pub fn load(path: &Path) -> Result<Self, MinerError> {
        if !path.exists() {
            warn!(
                "Extraction config {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()?;
        let file: IniFile = settings.try_deserialize()?;
        info!(config = ?file.default, "Loaded extraction config from {}", path.display());
        Ok(file.default)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agents
            .lines()
            .map(str::trim)
            .find(|ua| !ua.is_empty())
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout.max(1))
    }
}
