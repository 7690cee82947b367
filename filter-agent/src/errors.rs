use thiserror::Error;

use crate::schema::FilterSchema;

/// Errors from [`crate::FilterExtractionAgent::extract`].
///
/// Only [`ExtractionError::Unavailable`] is an infrastructure failure; a query
/// from which nothing can be extracted yields an `Ok` schema without filters.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("[Filter Agent] query is empty")]
    EmptyQuery,

    /// Neither provider produced a usable answer.
    ///
    /// `degraded` is the pass-through schema callers fall back to.
    #[error("[Filter Agent] extraction unavailable: primary: {primary}; secondary: {}", .secondary.as_deref().unwrap_or("not configured"))]
    Unavailable {
        degraded: Box<FilterSchema>,
        primary: String,
        secondary: Option<String>,
    },

    #[error("[Filter Agent] extraction cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Schema to continue with when extraction is unavailable.
    pub fn degraded_schema(&self) -> Option<&FilterSchema> {
        match self {
            ExtractionError::Unavailable { degraded, .. } => Some(degraded),
            _ => None,
        }
    }

    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::Unavailable { .. })
    }
}

/// Model output that does not honour the JSON contract.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("[Filter Agent] response is not JSON: {0}")]
    NotJson(String),

    #[error("[Filter Agent] response violates the output contract: {0}")]
    Contract(String),
}

/// Errors loading an attribute vocabulary.
#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("[Filter Agent] cannot read vocabulary {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[Filter Agent] invalid vocabulary YAML: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("[Filter Agent] invalid vocabulary: {0}")]
    Invalid(String),
}
