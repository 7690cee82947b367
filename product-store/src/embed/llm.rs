//! Embedding provider backed by the embedding slot of [`LlmServiceProfiles`].

use std::sync::Arc;

use ai_llm_service::{RetryError, service_profiles::LlmServiceProfiles};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{EmbeddingsProvider, StoreError};

/// Query embedder using whichever provider the profiles configure.
#[derive(Clone)]
pub struct LlmEmbedder {
    svc: Arc<LlmServiceProfiles>,
    dim: usize,
}

impl LlmEmbedder {
    /// `dim` is the expected vector length; other lengths are rejected.
    pub fn new(svc: Arc<LlmServiceProfiles>, dim: usize) -> Self {
        Self { svc, dim }
    }
}

impl EmbeddingsProvider for LlmEmbedder {
    fn model(&self) -> &str {
        &self.svc.embedding_config().model
    }

    fn embed<'a>(
        &'a self,
        text: &'a str,
        cancel: &'a CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, StoreError>> + Send + 'a>>
    {
        Box::pin(async move {
            let vector = self.svc.embed_query(text, cancel).await.map_err(|e| match e {
                RetryError::Cancelled => StoreError::Cancelled,
                other => StoreError::Embedding(other.to_string()),
            })?;

            if vector.len() != self.dim {
                warn!(
                    target: "product_store::embed",
                    model = %self.model(),
                    got = vector.len(),
                    want = self.dim,
                    "embedding dimensionality mismatch"
                );
                return Err(StoreError::VectorSizeMismatch {
                    got: vector.len(),
                    want: self.dim,
                });
            }
            Ok(vector)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ai_llm_service::{LlmModelConfig, LlmProfilesConfig, LlmProvider, RetryPolicy};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn ollama(uri: &str, model: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: model.into(),
            endpoint: uri.into(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(2),
            json_mode: false,
        }
    }

    fn embedder(uri: &str, dim: usize) -> LlmEmbedder {
        let svc = LlmServiceProfiles::new(LlmProfilesConfig {
            primary: ollama(uri, "qwen3:8b"),
            secondary: None,
            embedding: ollama(uri, "nomic-embed-text"),
            retry: RetryPolicy::once(Duration::from_secs(2)),
            health_timeout_secs: Some(1),
        })
        .unwrap();
        LlmEmbedder::new(Arc::new(svc), dim)
    }

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.1, 0.2, 0.3]})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn returns_vectors_of_expected_dimension() {
        let server = server().await;
        let e = embedder(&server.uri(), 3);
        assert_eq!(e.model(), "nomic-embed-text");
        let v = e.embed("vase noir", &CancellationToken::new()).await.unwrap();
        assert_eq!(v.len(), 3);
    }

    #[tokio::test]
    async fn rejects_wrong_dimension() {
        let server = server().await;
        let err = embedder(&server.uri(), 768)
            .embed("vase noir", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VectorSizeMismatch { got: 3, want: 768 }));
    }

    #[tokio::test]
    async fn cancelled_token_aborts() {
        let server = server().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = embedder(&server.uri(), 3).embed("x", &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
    }
}
