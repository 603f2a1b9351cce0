pub mod embed;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod select;
pub mod vectorizer;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MinerError;
pub use embed::{Embedder, HashingEmbedder};
pub use vectorizer::PhraseVectorizer;

const DOC_WEIGHT: f32 = 3.0;
const SEED_WEIGHT: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordCandidate {
    pub phrase: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Feature hashing, no model files needed
    #[default]
    Hashing,
    /// all-MiniLM-L6-v2 via ONNX Runtime (`onnx` feature)
    Onnx,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeywordSettings {
    pub top_n: usize,
    pub diversity: f32,
    pub nr_candidates: usize,
    pub seeds: Vec<String>,
    pub max_phrase_words: usize,
    pub embedder: EmbedderKind,
    /// Dimension of the hashing embedder.
    pub dimension: usize,
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model_dir: PathBuf,
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self {
            top_n: 5,
            diversity: 0.5,
            nr_candidates: 20,
            seeds: vec!["meditation".into(), "meditate".into()],
            max_phrase_words: 3,
            embedder: EmbedderKind::Hashing,
            dimension: 512,
            model_dir: PathBuf::from("models/all-MiniLM-L6-v2"),
        }
    }
}

/// Builds the keyword model once per run.
pub struct ModelBuilder;

impl ModelBuilder {
    pub fn build(settings: &KeywordSettings) -> Result<KeywordModel, MinerError> {
        let embedder: Box<dyn Embedder> = match settings.embedder {
            EmbedderKind::Hashing => Box::new(HashingEmbedder::new(settings.dimension)?),
            #[cfg(feature = "onnx")]
            EmbedderKind::Onnx => Box::new(onnx::OnnxEmbedder::load(&settings.model_dir)?),
            #[cfg(not(feature = "onnx"))]
            EmbedderKind::Onnx => {
                return Err(MinerError::ModelInit(
                    "the onnx embedder needs the `onnx` feature".into(),
                ))
            }
        };
        Self::with_embedder(settings, embedder)
    }

    pub fn with_embedder(
        settings: &KeywordSettings,
        embedder: Box<dyn Embedder>,
    ) -> Result<KeywordModel, MinerError> {
        validate(settings)?;

        let seeds: Vec<&str> = settings
            .seeds
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        let seed = if seeds.is_empty() {
            None
        } else {
            let joined = seeds.join(" ");
            let vector = embedder
                .embed(&joined)
                .map_err(|e| MinerError::ModelInit(format!("seed embedding failed: {}", e)))?;
            Some(vector)
        };

        info!(
            embedder = embedder.name(),
            dimension = embedder.dimension(),
            seeds = seeds.len(),
            top_n = settings.top_n,
            "Keyword model ready"
        );

        Ok(KeywordModel {
            embedder,
            vectorizer: PhraseVectorizer::new(settings.max_phrase_words),
            seed,
            top_n: settings.top_n,
            nr_candidates: settings.nr_candidates,
            diversity: settings.diversity,
        })
    }
}

fn validate(settings: &KeywordSettings) -> Result<(), MinerError> {
    let invalid = |msg: String| Err(MinerError::ModelInit(msg));
    if settings.top_n == 0 {
        return invalid("top_n must be at least 1".into());
    }
    if !(0.0..=1.0).contains(&settings.diversity) {
        return invalid(format!(
            "diversity must be within [0, 1], got {}",
            settings.diversity
        ));
    }
    if settings.nr_candidates < settings.top_n {
        return invalid(format!(
            "nr_candidates ({}) must be at least top_n ({})",
            settings.nr_candidates, settings.top_n
        ));
    }
    if settings.max_phrase_words == 0 {
        return invalid("max_phrase_words must be at least 1".into());
    }
    Ok(())
}

/// Phrase extraction plus embedding-based ranking. Immutable once built.
pub struct KeywordModel {
    embedder: Box<dyn Embedder>,
    vectorizer: PhraseVectorizer,
    seed: Option<Vec<f32>>,
    top_n: usize,
    nr_candidates: usize,
    diversity: f32,
}

impl KeywordModel {
    /// At most `top_n` phrases from `text`, best first.
    pub fn extract_keywords(&self, text: &str) -> Result<Vec<KeywordCandidate>, MinerError> {
        let phrases = self.vectorizer.candidates(text);
        if phrases.is_empty() {
            return Ok(Vec::new());
        }

        let doc = self.embedder.embed(text)?;
        let doc = match &self.seed {
            Some(seed) => embed::weighted_mean(&doc, DOC_WEIGHT, seed, SEED_WEIGHT),
            None => doc,
        };
        let vectors = self.embedder.embed_batch(&phrases)?;
        if vectors.len() != phrases.len() {
            return Err(MinerError::Model(format!(
                "embedder returned {} vectors for {} phrases",
                vectors.len(),
                phrases.len()
            )));
        }

        let relevance: Vec<f32> = vectors.iter().map(|v| embed::cosine(v, &doc)).collect();
        let picked = select::diversify(
            &relevance,
            &vectors,
            self.top_n,
            self.nr_candidates,
            self.diversity,
        );
        debug!(candidates = phrases.len(), picked = picked.len(), "Scored phrases");

        let mut scored: Vec<(usize, f32)> =
            picked.into_iter().map(|i| (i, round4(relevance[i]))).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .map(|(i, score)| KeywordCandidate {
                phrase: phrases[i].clone(),
                score,
            })
            .collect())
    }
}

fn round4(x: f32) -> f32 {
    (x * 10_000.0).round() / 10_000.0
}
