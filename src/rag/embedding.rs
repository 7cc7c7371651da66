use std::sync::Arc;
use std::time::Duration;

use crate::core::config::EmbeddingSettings;
use crate::core::errors::EmbeddingError;
use crate::llm::LlmProvider;
use crate::text::{collapse_whitespace, truncate_chars};

/// Turns text into fixed-dimension vectors.
///
/// `embed` and `embed_batch` never fail: any backend problem yields a zero
/// vector of the configured dimension so one bad call cannot abort an
/// ingestion batch. `try_embed` exposes the typed error.
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn LlmProvider>,
    model: String,
    dimension: usize,
    max_chars: usize,
    batch_size: usize,
    timeout: Duration,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: &EmbeddingSettings) -> Self {
        Self {
            provider,
            model: settings.model.clone(),
            dimension: settings.dimension,
            max_chars: settings.max_chars,
            batch_size: settings.batch_size.max(1),
            timeout: settings.timeout,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimension]
    }

    /// Collapses whitespace and cuts to the character budget.
    pub fn prepare(&self, text: &str) -> String {
        let cleaned = collapse_whitespace(text);
        truncate_chars(&cleaned, self.max_chars).to_string()
    }

    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.try_embed(text).await {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!("Embedding failed, using zero vector: {}", err);
                self.zero_vector()
            }
        }
    }

    pub async fn try_embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.call(vec![self.prepare(text)]).await?;
        vectors.pop().ok_or(EmbeddingError::Count {
            expected: 1,
            actual: 0,
        })
    }

    /// One vector per input, in order. Failed batches are retried item by
    /// item before falling back to zero vectors.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let prepared: Vec<String> = batch.iter().map(|t| self.prepare(t)).collect();
            match self.call(prepared).await {
                Ok(vectors) => out.extend(vectors),
                Err(err) => {
                    tracing::warn!(
                        batch_len = batch.len(),
                        "Batch embedding failed, retrying per item: {}",
                        err
                    );
                    for text in batch {
                        out.push(self.embed(text).await);
                    }
                }
            }
        }

        out
    }

    async fn call(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = inputs.len();
        let vectors = tokio::time::timeout(self.timeout, self.provider.embed(&inputs, &self.model))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))?
            .map_err(EmbeddingError::Backend)?;

        if vectors.len() != expected {
            return Err(EmbeddingError::Count {
                expected,
                actual: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbeddingError::Dimension {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{EmbedMode, ScriptedProvider};

    fn service(mode: EmbedMode, dimension: usize) -> EmbeddingService {
        let settings = EmbeddingSettings {
            dimension,
            max_chars: 20,
            batch_size: 2,
            ..EmbeddingSettings::default()
        };
        EmbeddingService::new(Arc::new(ScriptedProvider::new(mode)), &settings)
    }

    #[tokio::test]
    async fn failing_backend_yields_zero_vector_of_dimension() {
        let service = service(EmbedMode::Fail, 1536);
        let vector = service.embed("binary search trees").await;
        assert_eq!(vector.len(), 1536);
        assert!(vector.iter().all(|v| *v == 0.0));
        assert!(matches!(
            service.try_embed("x").await,
            Err(EmbeddingError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected_then_zeroed() {
        let service = service(EmbedMode::WrongDimension(3), 8);
        assert!(matches!(
            service.try_embed("graphs").await,
            Err(EmbeddingError::Dimension { expected: 8, actual: 3 })
        ));
        assert_eq!(service.embed("graphs").await, vec![0.0; 8]);
    }

    #[tokio::test]
    async fn batch_returns_one_vector_per_input() {
        let service = service(EmbedMode::Hashed(16), 16);
        let texts: Vec<String> = ["heaps", "stacks", "queues"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = service.embed_batch(&texts).await;
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 16));

        let failing = service_with_fail();
        let zeroed = failing.embed_batch(&texts).await;
        assert_eq!(zeroed.len(), 3);
        assert!(zeroed.iter().all(|v| v.len() == 4 && v.iter().all(|x| *x == 0.0)));
    }

    fn service_with_fail() -> EmbeddingService {
        service(EmbedMode::Fail, 4)
    }

    #[test]
    fn prepare_collapses_whitespace_and_truncates() {
        let service = service(EmbedMode::Fail, 4);
        assert_eq!(service.prepare("  a \n\n b\tc "), "a b c");
        assert_eq!(service.prepare(&"x".repeat(50)).len(), 20);
    }
}
