use sha2::{Digest, Sha256};

use crate::error::MinerError;

/// Text → dense vector. Implementations must be deterministic and safe to
/// share across mining threads.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, MinerError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MinerError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

const TRIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing embedder: every lowercase word and every character
/// trigram of a padded word lands in a signed bucket. Needs no model files.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, MinerError> {
        if dimension == 0 {
            return Err(MinerError::ModelInit(
                "embedding dimension must be greater than 0".into(),
            ));
        }
        Ok(Self { dimension })
    }

    fn add(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let h = feature_hash(feature);
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// First 8 bytes of the feature's SHA-256, big-endian. Stable across
/// platforms and toolchains.
fn feature_hash(feature: &str) -> u64 {
    Sha256::digest(feature.as_bytes())
        .iter()
        .take(8)
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, MinerError> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add(&mut vector, word, 1.0);

            let padded: Vec<char> = std::iter::once(' ')
                .chain(word.chars())
                .chain(std::iter::once(' '))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }

        normalize(&mut vector);
        Ok(vector)
    }
}

/// Scale to unit length in place. The zero vector stays zero.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Weighted mean of two equally sized vectors.
pub fn weighted_mean(a: &[f32], wa: f32, b: &[f32], wb: f32) -> Vec<f32> {
    let total = wa + wb;
    a.iter()
        .zip(b)
        .map(|(x, y)| (x * wa + y * wb) / total)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_hash_is_pinned() {
        assert_eq!(feature_hash("meditation"), 0x6d19_d7f8_4196_d56a);
        assert_eq!(feature_hash("meditation") % 512, 362);
        assert_eq!(feature_hash("#me"), 0x7f22_3be1_a3e3_a4e4);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(matches!(
            HashingEmbedder::new(0),
            Err(MinerError::ModelInit(_))
        ));
    }

    #[test]
    fn embeddings_are_deterministic_and_unit_length() {
        let e = HashingEmbedder::new(128).unwrap();
        let a = e.embed("Guided meditation for beginners").unwrap();
        let b = e.embed("Guided meditation for beginners").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn case_does_not_matter() {
        let e = HashingEmbedder::new(256).unwrap();
        assert_eq!(e.embed("Meditation").unwrap(), e.embed("meditation").unwrap());
    }

    #[test]
    fn shared_words_raise_similarity() {
        let e = HashingEmbedder::new(512).unwrap();
        let base = e.embed("mindful breathing").unwrap();
        let near = e.embed("breathing exercises").unwrap();
        let far = e.embed("tax accountant").unwrap();
        assert!(cosine(&base, &near) > cosine(&base, &far));
    }

    #[test]
    fn empty_text_embeds_to_zero() {
        let e = HashingEmbedder::new(16).unwrap();
        let v = e.embed("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine(&v, &v), 0.0);
    }

    #[test]
    fn batch_matches_single_calls() {
        let e = HashingEmbedder::new(64).unwrap();
        let texts = vec!["calm".to_string(), "focus".to_string()];
        let batch = e.embed_batch(&texts).unwrap();
        assert_eq!(batch[0], e.embed("calm").unwrap());
        assert_eq!(batch[1], e.embed("focus").unwrap());
    }

    #[test]
    fn weighted_mean_leans_toward_heavier_vector() {
        let m = weighted_mean(&[1.0, 0.0], 3.0, &[0.0, 1.0], 1.0);
        assert_eq!(m, vec![0.75, 0.25]);
    }
}
