use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::provider::validate_texts;
use super::EmbeddingProvider;
use crate::error::VectorResult;
use crate::models::validate_dimension;

/// Offline provider: hashed bag of lowercase tokens, L2-normalized.
///
/// The same text always yields the same vector, and texts sharing words
/// score higher than unrelated ones. Used by tests and local runs with no
/// embedding endpoint.
#[derive(Debug, Clone)]
pub struct DeterministicProvider {
    dimension: u32,
    model: String,
}

impl DeterministicProvider {
    pub fn new(dimension: u32) -> VectorResult<Self> {
        validate_dimension(dimension)?;
        Ok(Self {
            dimension,
            model: format!("deterministic-{}", dimension),
        })
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension as usize;
        let mut vector = vec![0f32; dim];

        for token in text.split_whitespace() {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(head);

            let slot = (hash % dim as u64) as usize;
            let weight = 0.5 + ((hash >> 40) as f32 / (1u64 << 24) as f32) * 0.5;
            vector[slot] += weight;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        vector.iter_mut().for_each(|x| *x /= norm);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> u32 {
        self.dimension
    }

    async fn embed_many(&self, texts: &[String]) -> VectorResult<Vec<Vec<f32>>> {
        validate_texts(texts)?;
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_same_text_same_vector() {
        let provider = DeterministicProvider::new(64).unwrap();
        let a = provider.embed_one("refund policy").await.unwrap();
        let b = provider.embed_one("Refund   POLICY").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_vectors_are_unit_length() {
        let provider = DeterministicProvider::new(32).unwrap();
        let v = provider.embed_one("shipping takes three days").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_shared_words_score_higher() {
        let provider = DeterministicProvider::new(256).unwrap();
        let texts = vec![
            "refund policy for orders".to_string(),
            "our refund policy".to_string(),
            "kubernetes pod scheduling".to_string(),
        ];
        let vectors = provider.embed_many(&texts).await.unwrap();
        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let provider = DeterministicProvider::new(8).unwrap();
        assert!(provider.embed_one("   ").await.unwrap_err().is_validation());
        assert!(provider.embed_many(&[]).await.unwrap_err().is_validation());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(DeterministicProvider::new(0).is_err());
    }
}
