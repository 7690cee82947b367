//! Qdrant connection and corpus configuration.

use std::time::Duration;

use ai_llm_service::RetryPolicy;
use ai_llm_service::error_handler::{
    env_opt, env_opt_u32, env_opt_u64, must_env, validate_http_endpoint,
};

use crate::errors::StoreError;

/// Dimensionality of the reference corpus embeddings (`text-embedding-004`).
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Configuration for the product collection.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Qdrant gRPC endpoint, e.g. `http://localhost:6334`.
    pub qdrant_url: String,
    /// Optional API key for Qdrant Cloud.
    pub qdrant_api_key: Option<String>,
    /// Product collection.
    pub collection: String,
    /// Named vector to search; `None` for the collection's default vector.
    pub vector_name: Option<String>,
    /// Model the corpus was embedded with; queries must use the same one.
    pub embedding_model: Option<String>,
    /// Dimensionality of the corpus vectors.
    pub embedding_dim: usize,
    /// Budget for each Qdrant call.
    pub retry: RetryPolicy,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            qdrant_url: url.into(),
            qdrant_api_key: None,
            collection: collection.into(),
            vector_name: None,
            embedding_model: None,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            retry: RetryPolicy {
                attempts: 3,
                timeout: Duration::from_secs(10),
                ..RetryPolicy::default()
            },
        }
    }

    /// Reads `QDRANT_URL`, `QDRANT_COLLECTION` (both required), `QDRANT_API_KEY`,
    /// `QDRANT_VECTOR_NAME`, `CORPUS_EMBEDDING_MODEL`, `EMBEDDING_DIM`,
    /// `QDRANT_RETRY_ATTEMPTS` and `QDRANT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, StoreError> {
        let cfg_err = |e: ai_llm_service::AiLlmError| StoreError::Config(e.to_string());

        let mut cfg = Self::new(
            must_env("QDRANT_URL").map_err(cfg_err)?,
            must_env("QDRANT_COLLECTION").map_err(cfg_err)?,
        );
        cfg.qdrant_api_key = env_opt("QDRANT_API_KEY");
        cfg.vector_name = env_opt("QDRANT_VECTOR_NAME");
        cfg.embedding_model = env_opt("CORPUS_EMBEDDING_MODEL");
        if let Some(dim) = env_opt_u32("EMBEDDING_DIM").map_err(cfg_err)? {
            cfg.embedding_dim = dim as usize;
        }
        if let Some(n) = env_opt_u32("QDRANT_RETRY_ATTEMPTS").map_err(cfg_err)? {
            cfg.retry.attempts = n.max(1);
        }
        if let Some(secs) = env_opt_u64("QDRANT_TIMEOUT_SECS").map_err(cfg_err)? {
            cfg.retry.timeout = Duration::from_secs(secs.max(1));
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        validate_http_endpoint("QDRANT_URL", &self.qdrant_url)
            .map_err(|e| StoreError::Config(e.to_string()))?;
        if self.collection.trim().is_empty() {
            return Err(StoreError::Config("collection is empty".into()));
        }
        if self.embedding_dim == 0 {
            return Err(StoreError::Config("embedding_dim must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_values() {
        assert!(StoreConfig::new("http://localhost:6334", "products").validate().is_ok());
        assert!(StoreConfig::new("localhost:6334", "products").validate().is_err());
        assert!(StoreConfig::new("http://localhost:6334", " ").validate().is_err());

        let mut cfg = StoreConfig::new("http://localhost:6334", "products");
        cfg.embedding_dim = 0;
        assert!(cfg.validate().is_err());
    }
}
