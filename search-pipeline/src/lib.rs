//! Hybrid product search.
//!
//! Text query → [`filter_agent::FilterExtractionAgent`] → Filter Schema →
//! [`QueryAssembler`] → executable query → [`QueryExecutor`] → ranked results.
//!
//! [`SearchPipeline`] wires the production implementations (LLM profiles,
//! Qdrant, provider embeddings) from one [`PipelineConfig`]; the executor
//! itself only sees the [`product_store::ProductIndex`] and
//! [`product_store::EmbeddingsProvider`] traits.

pub mod assembler;
pub mod config;
pub mod errors;
pub mod executor;

use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;
use ai_llm_service::health_service::HealthStatus;
use filter_agent::{ExtractionError, FilterExtractionAgent};
use product_store::{EmbeddingsProvider, LlmEmbedder, ProductIndex, QdrantIndex, StoreError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use assembler::{AssemblyStats, ExecutableQuery, QueryAssembler, VectorStage};
pub use config::{ExecutorConfig, PipelineConfig};
pub use errors::{PipelineError, Result};
pub use executor::{ExtractionInfo, QueryExecutor, ResultItem, SearchOptions, SearchResponse};
pub use product_store::StoreHealth;

/// Text used to probe the embedding dimensionality at startup.
const PROBE_TEXT: &str = "dimension probe";

/// Reachability of every upstream.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineHealth {
    pub ok: bool,
    pub llm: Vec<HealthStatus>,
    pub store: StoreHealth,
}

/// Production pipeline over Qdrant and the configured LLM providers.
pub struct SearchPipeline {
    llm: Arc<LlmServiceProfiles>,
    index: Arc<QdrantIndex>,
    embedder: Arc<LlmEmbedder>,
    agent: Arc<FilterExtractionAgent>,
    executor: QueryExecutor,
    expected_model: Option<String>,
    dim: usize,
}

impl SearchPipeline {
    /// Builds every component; no network call is made.
    ///
    /// # Errors
    /// [`PipelineError::Config`] for invalid provider, store or executor settings.
    pub fn connect(cfg: PipelineConfig) -> Result<Self> {
        cfg.executor.validate()?;
        let llm = Arc::new(
            LlmServiceProfiles::new(cfg.llm).map_err(|e| PipelineError::Config(e.to_string()))?,
        );
        let index = Arc::new(QdrantIndex::new(&cfg.store).map_err(|e| PipelineError::Config(e.to_string()))?);
        let embedder = Arc::new(LlmEmbedder::new(llm.clone(), cfg.store.embedding_dim));
        let vocab = Arc::new(cfg.vocabulary);
        let agent = Arc::new(FilterExtractionAgent::new(llm.clone(), vocab.clone(), cfg.agent));
        let assembler = QueryAssembler::new(vocab, cfg.store.vector_name.clone());
        let executor = QueryExecutor::new(
            agent.clone(),
            assembler,
            embedder.clone(),
            index.clone(),
            cfg.executor,
        );

        info!(
            target: "search_pipeline::startup",
            collection = %cfg.store.collection,
            vector = %cfg.store.vector_name.as_deref().unwrap_or("<default>"),
            vocabulary = %agent.vocabulary().name,
            "pipeline built"
        );

        Ok(Self {
            llm,
            index,
            embedder,
            agent,
            executor,
            expected_model: cfg.store.embedding_model,
            dim: cfg.store.embedding_dim,
        })
    }

    /// Verifies that query embeddings are comparable with the corpus.
    ///
    /// # Errors
    /// [`PipelineError::EmbeddingMismatch`] on model or dimension mismatch,
    /// [`PipelineError::UpstreamUnavailable`] when a probe cannot run.
    pub async fn check_startup(&self, cancel: &CancellationToken) -> Result<()> {
        check_embedding_compat(
            self.embedder.as_ref(),
            self.index.as_ref(),
            self.expected_model.as_deref(),
            self.dim,
            cancel,
        )
        .await
    }

    pub async fn execute(&self, query: &str, options: SearchOptions) -> Result<SearchResponse> {
        self.executor.execute(query, options).await
    }

    /// Filter extraction only, for diagnostics.
    pub async fn extract(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<filter_agent::Extraction, ExtractionError> {
        self.agent.extract_detailed(query, cancel).await
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub async fn health(&self) -> PipelineHealth {
        let llm = self.llm.health_all().await;
        let store = self.index.health().await;
        PipelineHealth {
            ok: store.ok && llm.iter().all(|s| s.ok),
            llm,
            store,
        }
    }
}

/// Startup check shared by [`SearchPipeline::check_startup`] and tests.
///
/// Checks, in order: the embedder's model against `expected_model`, the
/// probe vector length against `dim`, and the index vector size against `dim`.
pub async fn check_embedding_compat(
    embedder: &dyn EmbeddingsProvider,
    index: &dyn ProductIndex,
    expected_model: Option<&str>,
    dim: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(want) = expected_model {
        if embedder.model() != want {
            return Err(PipelineError::EmbeddingMismatch(format!(
                "query model {} differs from corpus model {want}",
                embedder.model()
            )));
        }
    }

    let probe = embedder.embed(PROBE_TEXT, cancel).await.map_err(|e| match e {
        StoreError::VectorSizeMismatch { got, want } => PipelineError::EmbeddingMismatch(format!(
            "model {} returns {got} dimensions, corpus has {want}",
            embedder.model()
        )),
        StoreError::Cancelled => PipelineError::Cancelled,
        other => PipelineError::UpstreamUnavailable {
            service: "embedding",
            detail: other.to_string(),
        },
    })?;
    if probe.len() != dim {
        return Err(PipelineError::EmbeddingMismatch(format!(
            "model {} returns {} dimensions, corpus has {dim}",
            embedder.model(),
            probe.len()
        )));
    }

    let size = index.vector_size().await.map_err(|e| match e {
        StoreError::Config(detail) => PipelineError::Config(detail),
        other => PipelineError::UpstreamUnavailable {
            service: "vector store",
            detail: other.to_string(),
        },
    })?;
    if size != dim {
        return Err(PipelineError::EmbeddingMismatch(format!(
            "collection vector size is {size}, expected {dim}"
        )));
    }

    info!(target: "search_pipeline::startup", model = %embedder.model(), dim, "embedding compatibility ok");
    Ok(())
}
