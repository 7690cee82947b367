use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use filter_agent::{Extraction, ExtractionError};
use search_pipeline::{PipelineHealth, SearchOptions, SearchPipeline, SearchResponse};
use tokio_util::sync::CancellationToken;

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the handlers need from the search pipeline.
pub trait SearchBackend: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        options: SearchOptions,
    ) -> BoxFut<'a, search_pipeline::Result<SearchResponse>>;

    fn extract<'a>(
        &'a self,
        query: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFut<'a, Result<Extraction, ExtractionError>>;

    fn health<'a>(&'a self) -> BoxFut<'a, PipelineHealth>;
}

impl SearchBackend for SearchPipeline {
    fn search<'a>(
        &'a self,
        query: &'a str,
        options: SearchOptions,
    ) -> BoxFut<'a, search_pipeline::Result<SearchResponse>> {
        Box::pin(self.execute(query, options))
    }

    fn extract<'a>(
        &'a self,
        query: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFut<'a, Result<Extraction, ExtractionError>> {
        Box::pin(SearchPipeline::extract(self, query, cancel))
    }

    fn health<'a>(&'a self) -> BoxFut<'a, PipelineHealth> {
        Box::pin(SearchPipeline::health(self))
    }
}

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn SearchBackend>,
    /// Upper bound for one request; in-flight LLM and store calls are
    /// cancelled when it elapses.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
