//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI (text-embedding-ada-002, text-embedding-3-small)
//! - Deterministic mock vectors for tests and offline runs

use crate::config::{AppConfig, EmbeddingConfig, OpenAiConfig, Provider};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(openai: &OpenAiConfig, embedding: &EmbeddingConfig) -> Result<Self> {
        let api_key = openai.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "OpenAI API key required for embeddings (OPENAI_API_KEY)".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(openai.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: embedding.model.clone(),
            dimension: embedding.dimension,
            base_url: openai.api_base.trim_end_matches('/').to_string(),
            max_retries: embedding.max_retries.max(1),
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            match self.make_request(text).await {
                Ok(embedding) => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &self.model,
                        1,
                        true,
                    );
                    return Ok(embedding);
                }
                // A wrong dimension will not fix itself on retry
                Err(e @ AppError::EmbeddingDimension { .. }) => return Err(e),
                Err(e) => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &self.model,
                        1,
                        false,
                    );
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: text,
            model: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let body = response.text().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to read response: {}", e),
        })?;

        parse_embedding(&body, self.dimension)
    }
}

/// First vector of an `/embeddings` response body, checked against `dimension`
fn parse_embedding(body: &str, dimension: usize) -> Result<Vec<f32>> {
    let result: OpenAIResponse = serde_json::from_str(body).map_err(|e| AppError::EmbeddingError {
        message: format!("Failed to parse response: {}", e),
    })?;

    let embedding = result
        .data
        .into_iter()
        .next()
        .map(|e| e.embedding)
        .ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })?;

    check_dimension(&embedding, dimension)?;
    Ok(embedding)
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request_with_retry(text).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Reject vectors that would not fit the `vector(N)` column
pub fn check_dimension(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(AppError::EmbeddingDimension {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}

/// Mock embedder for testing
///
/// Vectors are seeded from the input text, so the same text always maps to
/// the same vector. A fixed vector can be pinned with [`MockEmbedder::fixed`].
pub struct MockEmbedder {
    dimension: usize,
    fixed: Option<Vec<f32>>,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fixed: None,
        }
    }

    /// Always return `vector`, whatever the input
    pub fn fixed(vector: Vec<f32>) -> Self {
        Self {
            dimension: vector.len(),
            fixed: Some(vector),
        }
    }

    fn seeded(&self, text: &str) -> Vec<f32> {
        use rand::{Rng, SeedableRng};
        use std::hash::{Hash, Hasher};

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng = rand::rngs::StdRng::seed_from_u64(hasher.finish());
        (0..self.dimension).map(|_| rng.gen::<f32>() - 0.5).collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(match &self.fixed {
            Some(vector) => vector.clone(),
            None => self.seeded(text),
        })
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding.provider {
        Provider::OpenAi => Ok(Arc::new(OpenAIEmbedder::new(
            &config.openai,
            &config.embedding,
        )?)),
        Provider::Mock => {
            tracing::warn!("Using mock embedder; retrieval results are not meaningful");
            Ok(Arc::new(MockEmbedder::new(config.embedding.dimension)))
        }
        Provider::Anthropic => Err(AppError::Configuration {
            message: "Anthropic does not offer an embedding endpoint".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new(1536);
        let embedding = embedder.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 1536);
    }

    #[tokio::test]
    async fn test_mock_is_deterministic_per_text() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.embed("wrongful termination").await.unwrap();
        let b = embedder.embed("wrongful termination").await.unwrap();
        let c = embedder.embed("land dispute").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_fixed_mock() {
        let embedder = MockEmbedder::fixed(vec![1.0, 0.0, 0.0]);
        assert_eq!(embedder.dimension(), 3);
        assert_eq!(embedder.embed("anything").await.unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[0.0; 4], 4).is_ok());
        let err = check_dimension(&[0.0; 3], 4).unwrap_err();
        assert!(matches!(err, AppError::EmbeddingDimension { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_parse_embedding_response() {
        let body = r#"{
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.25, -0.5, 1.0]}],
            "model": "text-embedding-ada-002",
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        }"#;
        assert_eq!(parse_embedding(body, 3).unwrap(), vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_parse_embedding_wrong_dimension() {
        let body = r#"{"data": [{"embedding": [0.1, 0.2]}]}"#;
        let err = parse_embedding(body, 1536).unwrap_err();
        assert!(matches!(err, AppError::EmbeddingDimension { expected: 1536, actual: 2 }));
    }

    #[test]
    fn test_parse_embedding_empty_or_malformed() {
        assert!(matches!(
            parse_embedding(r#"{"data": []}"#, 3),
            Err(AppError::EmbeddingError { .. })
        ));
        assert!(matches!(
            parse_embedding("<html>bad gateway</html>", 3),
            Err(AppError::EmbeddingError { .. })
        ));
    }

    #[test]
    fn test_openai_requires_key() {
        let config = AppConfig::default();
        let result = OpenAIEmbedder::new(&config.openai, &config.embedding);
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }
}
