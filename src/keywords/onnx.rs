//! Sentence-transformer embedder (all-MiniLM-L6-v2 exported to ONNX).
//!
//! Expects `model.onnx` and `tokenizer.json` in one directory. Token
//! embeddings are mean-pooled under the attention mask and L2-normalised.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, Axis};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tokenizers::Tokenizer;
use tracing::info;

use super::embed::{normalize, Embedder};
use crate::error::MinerError;

const HIDDEN_DIM: usize = 384;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl OnnxEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self, MinerError> {
        Self::try_load(model_dir).map_err(|e| MinerError::ModelInit(format!("{:#}", e)))
    }

    fn try_load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !model_path.exists() {
            bail!("ONNX model file not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            bail!("Tokenizer file not found: {}", tokenizer_path.display());
        }

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let embedder = Self {
            session: Mutex::new(session),
            tokenizer,
        };
        let probe = embedder.run("validation test")?;
        if probe.len() != HIDDEN_DIM {
            bail!(
                "Model outputs {} dimensions (expected {})",
                probe.len(),
                HIDDEN_DIM
            );
        }
        info!(model = %model_dir.display(), "ONNX embedding model loaded");
        Ok(embedder)
    }

    fn run(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let len = input_ids.len();
        let token_types = vec![0i64; len];

        let input_ids = Array2::from_shape_vec((1, len), input_ids)?;
        let attention_mask = Array2::from_shape_vec((1, len), mask.clone())?;
        let token_type_ids = Array2::from_shape_vec((1, len), token_types)?;

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session.run(ort::inputs![
            "input_ids" => Value::from_array(input_ids)?,
            "attention_mask" => Value::from_array(attention_mask)?,
            "token_type_ids" => Value::from_array(token_type_ids)?
        ])?;

        // [batch, seq_len, hidden]
        let tokens = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;
        if tokens.ndim() != 3 {
            bail!("Unexpected output shape {:?}", tokens.shape());
        }
        let tokens = tokens.index_axis(Axis(0), 0);
        let (seq_len, hidden) = (tokens.shape()[0], tokens.shape()[1]);

        let mut pooled = vec![0.0f32; hidden];
        let mut weight = 0.0f32;
        for i in 0..seq_len.min(mask.len()) {
            let m = mask[i] as f32;
            weight += m;
            for (j, slot) in pooled.iter_mut().enumerate() {
                *slot += tokens[[i, j]] * m;
            }
        }
        for slot in &mut pooled {
            *slot /= weight.max(1e-9);
        }
        normalize(&mut pooled);
        Ok(pooled)
    }
}

impl Embedder for OnnxEmbedder {
    fn name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }

    fn dimension(&self) -> usize {
        HIDDEN_DIM
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, MinerError> {
        self.run(text).map_err(|e| MinerError::Model(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_files_fail_initialization() {
        let dir = tempfile::tempdir().unwrap();
        match OnnxEmbedder::load(dir.path()) {
            Err(MinerError::ModelInit(msg)) => assert!(msg.contains("model.onnx")),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("loaded a model from an empty directory"),
        }
    }
}
