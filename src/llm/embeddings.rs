//! Text embeddings
//!
//! [`Embedder`] is the seam between the RAG pipeline and the embedding model.
//! The production implementation calls the OpenAI-compatible `/embeddings`
//! endpoint; [`crate::rag::cache::CachedEmbedder`] wraps any embedder with an
//! LRU cache.

use crate::types::{AppError, Result};
use async_trait::async_trait;

/// Produces dense vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::LLM("Embedding response was empty".to_string()))
    }

    /// Embed many texts. The output has one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier, part of every cache key.
    fn model_name(&self) -> &str;
}

#[cfg(feature = "openai")]
pub use openai_embedder::OpenAIEmbedder;

#[cfg(feature = "openai")]
mod openai_embedder {
    use super::Embedder;
    use crate::types::{AppError, Result};
    use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Inputs sent per request.
    const BATCH_SIZE: usize = 256;

    /// Embedder backed by the OpenAI embeddings endpoint.
    pub struct OpenAIEmbedder {
        client: Client<OpenAIConfig>,
        model: String,
    }

    impl OpenAIEmbedder {
        pub fn new(
            api_key: String,
            api_base: String,
            model: String,
            timeout: Duration,
        ) -> Result<Self> {
            let http = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| {
                    AppError::Configuration(format!("Failed to build HTTP client: {}", e))
                })?;

            let config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(api_base);

            Ok(Self {
                client: Client::with_config(config).with_http_client(http),
                model,
            })
        }
    }

    #[async_trait]
    impl Embedder for OpenAIEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut vectors = Vec::with_capacity(texts.len());

            for batch in texts.chunks(BATCH_SIZE) {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(&self.model)
                    .input(batch.to_vec())
                    .build()
                    .map_err(|e| AppError::LLM(format!("Failed to build request: {}", e)))?;

                let response = self
                    .client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(|e| AppError::LLM(format!("Embedding API error: {}", e)))?;

                if response.data.len() != batch.len() {
                    return Err(AppError::LLM(format!(
                        "Embedding API returned {} vectors for {} inputs",
                        response.data.len(),
                        batch.len()
                    )));
                }

                let mut data = response.data;
                data.sort_by_key(|d| d.index);
                vectors.extend(data.into_iter().map(|d| d.embedding));
            }

            Ok(vectors)
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn test_embed_batch_restores_input_order() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/embeddings"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "object": "list",
                    "model": "text-embedding-ada-002",
                    "data": [
                        { "object": "embedding", "index": 1, "embedding": [0.0, 1.0] },
                        { "object": "embedding", "index": 0, "embedding": [1.0, 0.0] }
                    ],
                    "usage": { "prompt_tokens": 4, "total_tokens": 4 }
                })))
                .mount(&server)
                .await;

            let embedder = OpenAIEmbedder::new(
                "sk-test".into(),
                server.uri(),
                "text-embedding-ada-002".into(),
                Duration::from_secs(5),
            )
            .expect("embedder");

            let vectors = embedder
                .embed_batch(&["first".to_string(), "second".to_string()])
                .await
                .expect("embeddings");

            assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        }

        #[tokio::test]
        async fn test_mismatched_count_is_an_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/embeddings"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "object": "list",
                    "model": "text-embedding-ada-002",
                    "data": [
                        { "object": "embedding", "index": 0, "embedding": [1.0, 0.0] }
                    ],
                    "usage": { "prompt_tokens": 4, "total_tokens": 4 }
                })))
                .mount(&server)
                .await;

            let embedder = OpenAIEmbedder::new(
                "sk-test".into(),
                server.uri(),
                "text-embedding-ada-002".into(),
                Duration::from_secs(5),
            )
            .expect("embedder");

            let result = embedder
                .embed_batch(&["a".to_string(), "b".to_string()])
                .await;
            assert!(matches!(result, Err(AppError::LLM(_))));
        }
    }
}
