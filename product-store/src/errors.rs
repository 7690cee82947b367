//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for product-store operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid or missing configuration.
    #[error("[Product Store] config error: {0}")]
    Config(String),

    /// Qdrant unreachable or failing after retries.
    #[error("[Product Store] qdrant unavailable: {0}")]
    Unavailable(String),

    /// Qdrant refused the filter (e.g. missing payload index).
    #[error("[Product Store] filter rejected by qdrant: {0}")]
    FilterRejected(String),

    /// A stored payload does not look like a product document.
    #[error("[Product Store] malformed payload: {0}")]
    Payload(String),

    /// Vector length differs from the collection's dimensionality.
    #[error("[Product Store] vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Query embedding failed after retries.
    #[error("[Product Store] embedding failed: {0}")]
    Embedding(String),

    #[error("[Product Store] operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Transient errors worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Maps a raw Qdrant client error message to a variant.
    ///
    /// The client only exposes status text, so classification is textual:
    /// index/filter complaints → [`StoreError::FilterRejected`], missing
    /// collections → [`StoreError::Config`], everything else →
    /// [`StoreError::Unavailable`].
    pub fn from_qdrant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("index required")
            || lower.contains("not indexed")
            || (lower.contains("filter") && (lower.contains("bad request") || lower.contains("invalid")))
        {
            StoreError::FilterRejected(msg)
        } else if lower.contains("collection") && lower.contains("not found") {
            StoreError::Config(msg)
        } else {
            StoreError::Unavailable(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_index_errors_as_filter_rejected() {
        let e = StoreError::from_qdrant(
            "status: InvalidArgument, message: \"Bad request: Index required but not found for \\\"attributes[].key\\\"\"",
        );
        assert!(matches!(e, StoreError::FilterRejected(_)));
        assert!(!e.is_transient());
    }

    #[test]
    fn classifies_missing_collection_as_config() {
        let e = StoreError::from_qdrant("Not found: Collection `products` doesn't exist!");
        assert!(matches!(e, StoreError::Config(_)));
    }

    #[test]
    fn transport_errors_are_transient() {
        let e = StoreError::from_qdrant("status: Unavailable, message: \"error trying to connect\"");
        assert!(e.is_transient());
    }
}
