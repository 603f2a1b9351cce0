use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds shared by both pipelines.
///
/// Per-item variants are caught at the pipeline boundary and turned into a
/// logged outcome; only `ModelInit` and `Config` abort a run.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("invalid URL {input:?}: {reason}")]
    InvalidInput { input: String, reason: String },

    #[error("no content for {0}")]
    NoContent(String),

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("malformed document: {0}")]
    Parse(String),

    #[error("failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("keyword model initialization failed: {0}")]
    ModelInit(String),

    #[error("keyword scoring failed: {0}")]
    Model(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl MinerError {
    /// Short, stable label used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            MinerError::InvalidInput { .. } => "invalid-input",
            MinerError::NoContent(_) => "no-content",
            MinerError::Fetch { .. } => "fetch-error",
            MinerError::Parse(_) => "parse-error",
            MinerError::Persist { .. } => "persist-error",
            MinerError::ModelInit(_) => "model-init",
            MinerError::Model(_) => "model-error",
            MinerError::Config(_) => "config-error",
        }
    }
}
