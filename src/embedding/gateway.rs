// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapts arbitrary text batches to an embedding provider.
//!
//! The gateway splits input into provider-sized batches and checks the
//! provider contract on the way back: one vector per text, in order, every
//! vector of the expected dimension.

use tracing::debug;

use super::provider::EmbeddingProvider;
use crate::errors::{RagError, Result};

/// Order- and dimension-checking wrapper around an [`EmbeddingProvider`].
pub struct EmbeddingGateway {
    provider: Box<dyn EmbeddingProvider>,
    dimension: usize,
}

impl EmbeddingGateway {
    /// Creates a gateway that expects vectors of `dimension` values.
    pub fn new(provider: Box<dyn EmbeddingProvider>, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
        }
    }

    /// Returns the model identifier of the wrapped provider.
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Returns the expected vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds `texts`, returning vector `i` for text `i`.
    pub fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.provider.batch_size().max(1);
        debug!(
            "Embedding {} texts with {} (batch size {})",
            texts.len(),
            self.provider.model_id(),
            batch_size
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let embedded = self
                .provider
                .embed_texts(batch)
                .map_err(RagError::embedding)?;

            if embedded.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            for vector in &embedded {
                if vector.len() != self.dimension {
                    return Err(RagError::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    });
                }
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    /// Embeds a single text as a one-element batch.
    pub fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RagError::Embedding("no vector returned for the question".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;

    /// Returns at most `vectors.len()` vectors and refuses oversized batches.
    struct FixedProvider {
        vectors: Vec<Vec<f32>>,
        batch_size: usize,
    }

    impl EmbeddingProvider for FixedProvider {
        fn model_id(&self) -> &str {
            "fixed"
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }

        fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if texts.len() > self.batch_size {
                anyhow::bail!("batch of {} exceeds {}", texts.len(), self.batch_size);
            }
            Ok(self.vectors.iter().take(texts.len()).cloned().collect())
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn model_id(&self) -> &str {
            "failing"
        }

        fn batch_size(&self) -> usize {
            8
        }

        fn embed_texts(&mut self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text number {}", i)).collect()
    }

    #[test]
    fn test_batches_preserve_order() {
        let mut gateway = EmbeddingGateway::new(Box::new(HashProvider::new(32)), 32);
        let input = texts(5);
        let all_at_once = gateway.embed(&input).unwrap();

        let mut reference = HashProvider::new(32);
        for (text, vector) in input.iter().zip(&all_at_once) {
            assert_eq!(&reference.embed_one(text).unwrap(), vector);
        }
    }

    #[test]
    fn test_splits_by_provider_batch_size() {
        let provider = FixedProvider {
            vectors: vec![vec![1.0, 0.0]; 10],
            batch_size: 2,
        };
        let mut gateway = EmbeddingGateway::new(Box::new(provider), 2);
        let vectors = gateway.embed(&texts(5)).unwrap();
        assert_eq!(vectors.len(), 5);
    }

    #[test]
    fn test_missing_vectors_is_embedding_error() {
        let provider = FixedProvider {
            vectors: vec![vec![1.0, 0.0]],
            batch_size: 8,
        };
        let mut gateway = EmbeddingGateway::new(Box::new(provider), 2);
        let err = gateway.embed(&texts(3)).unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[test]
    fn test_wrong_dimension_is_rejected() {
        let mut gateway = EmbeddingGateway::new(Box::new(HashProvider::new(16)), 384);
        let err = gateway.embed(&texts(1)).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 384,
                actual: 16
            }
        ));
    }

    #[test]
    fn test_provider_failure_is_wrapped() {
        let mut gateway = EmbeddingGateway::new(Box::new(FailingProvider), 4);
        let err = gateway.embed_one("question").unwrap_err();
        match err {
            RagError::Embedding(message) => assert!(message.contains("quota exceeded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_batch_skips_provider() {
        let mut gateway = EmbeddingGateway::new(Box::new(FailingProvider), 4);
        assert!(gateway.embed(&[]).unwrap().is_empty());
    }
}
