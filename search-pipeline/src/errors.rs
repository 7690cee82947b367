use thiserror::Error;

/// Request-level failures of the search pipeline.
///
/// Extraction problems never show up here: they degrade the request to a
/// pure vector search instead.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("[Search Pipeline] query is empty")]
    EmptyQuery,

    /// Query embeddings are not comparable with the corpus embeddings.
    #[error("[Search Pipeline] embedding mismatch: {0}")]
    EmbeddingMismatch(String),

    /// Embedding service or vector store still failing after retries.
    #[error("[Search Pipeline] {service} unavailable: {detail}")]
    UpstreamUnavailable {
        service: &'static str,
        detail: String,
    },

    #[error("[Search Pipeline] request cancelled")]
    Cancelled,

    #[error("[Search Pipeline] config error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether the whole process should stop (as opposed to this request only).
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, PipelineError::EmbeddingMismatch(_) | PipelineError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
