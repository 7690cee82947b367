//! Vector index abstraction used by the search pipeline.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::errors::StoreError;
use crate::filters::FilterExpr;
use crate::record::ScoredDocument;

/// One approximate nearest-neighbour request.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    /// Hits to return, best first.
    pub limit: usize,
    /// HNSW candidate list size (`num_candidates`); at least `limit`.
    pub hnsw_ef: u64,
    /// Server-side pre-filter; `None` searches the whole collection.
    pub filter: Option<FilterExpr>,
}

/// Read-only product index.
///
/// Implementations honour `cancel` and return [`StoreError::Cancelled`]
/// once it fires.
pub trait ProductIndex: Send + Sync {
    /// Nearest neighbours of `req.vector`, sorted by descending score.
    fn search<'a>(
        &'a self,
        req: &'a SearchRequest,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoredDocument>, StoreError>> + Send + 'a>>;

    /// Dimensionality of the searched vector.
    fn vector_size<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<usize, StoreError>> + Send + 'a>>;
}
