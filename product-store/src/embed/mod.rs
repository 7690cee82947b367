//! Query embedding providers.

use std::{future::Future, pin::Pin};

use tokio_util::sync::CancellationToken;

use crate::errors::StoreError;

/// Turns query text into a vector comparable with the corpus embeddings.
///
/// Implementations must return vectors of one fixed dimensionality and
/// honour `cancel`.
pub trait EmbeddingsProvider: Send + Sync {
    /// Model identifier, compared with the corpus model at startup.
    fn model(&self) -> &str;

    fn embed<'a>(
        &'a self,
        text: &'a str,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, StoreError>> + Send + 'a>>;
}

pub mod llm;
