pub mod extract;
pub mod health_route;
pub mod search;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{
    core::app_state::AppState,
    error_handler::{AppError, AppResult},
};

/// Awaits `fut` within the request timeout; on expiry cancels `cancel` so
/// the in-flight upstream calls stop.
pub(crate) async fn with_deadline<T, E>(
    state: &AppState,
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> AppResult<T>
where
    E: Into<AppError>,
{
    match tokio::time::timeout(state.request_timeout, fut).await {
        Ok(r) => r.map_err(Into::into),
        Err(_) => {
            cancel.cancel();
            Err(AppError::Timeout)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use ai_llm_service::ProviderSlot;
    use axum::{body::to_bytes, response::Response};
    use filter_agent::{Extraction, ExtractionError, FilterSchema};
    use search_pipeline::{
        AssemblyStats, ExtractionInfo, PipelineError, PipelineHealth, ResultItem, SearchOptions,
        SearchResponse, StoreHealth,
    };
    use tokio_util::sync::CancellationToken;

    use crate::core::app_state::SearchBackend;

    type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

    /// Backend answering from canned data. Queries containing "slow" wait for
    /// cancellation; "down" fails as an unavailable upstream.
    pub(crate) struct FakeBackend {
        pub healthy: bool,
    }

    impl SearchBackend for FakeBackend {
        fn search<'a>(
            &'a self,
            query: &'a str,
            options: SearchOptions,
        ) -> BoxFut<'a, search_pipeline::Result<SearchResponse>> {
            Box::pin(async move {
                if query.trim().is_empty() {
                    return Err(PipelineError::EmptyQuery);
                }
                if query.contains("slow") {
                    options.cancel.cancelled().await;
                    return Err(PipelineError::Cancelled);
                }
                if query.contains("down") {
                    return Err(PipelineError::UpstreamUnavailable {
                        service: "vector store",
                        detail: "connection refused".into(),
                    });
                }
                let bypassed = options.raw_filter.is_some();
                let schema = options.raw_filter.unwrap_or_else(|| FilterSchema::passthrough(query));
                let n = options.limit.unwrap_or(10).min(3);
                Ok(SearchResponse {
                    items: (0..n)
                        .map(|i| ResultItem {
                            rank: i + 1,
                            id: format!("p{i}"),
                            name: format!("Vase {i}"),
                            score: 0.9 - i as f32 * 0.1,
                            matched_attributes: Default::default(),
                            brand: None,
                            price: None,
                            currency: None,
                        })
                        .collect(),
                    schema,
                    extraction: ExtractionInfo {
                        slot: (!bypassed).then_some(ProviderSlot::Primary),
                        degraded: false,
                        bypassed,
                        low_confidence: false,
                        dropped_values: vec![],
                    },
                    assembly: AssemblyStats::default(),
                    filter_fallback: false,
                    latency_ms: 1,
                })
            })
        }

        fn extract<'a>(
            &'a self,
            query: &'a str,
            _cancel: &'a CancellationToken,
        ) -> BoxFut<'a, Result<Extraction, ExtractionError>> {
            Box::pin(async move {
                if query.contains("down") {
                    return Err(ExtractionError::Unavailable {
                        degraded: Box::new(FilterSchema::passthrough(query)),
                        primary: "timeout".into(),
                        secondary: None,
                    });
                }
                let mut schema = FilterSchema::passthrough("vase");
                schema.color = Some("black".into());
                schema.confidence = 0.9;
                Ok(Extraction {
                    schema,
                    slot: ProviderSlot::Primary,
                    dropped: vec![],
                    low_confidence: false,
                })
            })
        }

        fn health<'a>(&'a self) -> BoxFut<'a, PipelineHealth> {
            let ok = self.healthy;
            Box::pin(async move {
                PipelineHealth {
                    ok,
                    llm: vec![],
                    store: StoreHealth {
                        url: "http://localhost:6334".into(),
                        collection: "products".into(),
                        ok,
                        latency_ms: 1,
                        message: if ok { "ok".into() } else { "unreachable".into() },
                    },
                }
            })
        }
    }

    pub(crate) fn state(healthy: bool) -> crate::core::app_state::AppState {
        crate::core::app_state::AppState::new(std::sync::Arc::new(FakeBackend { healthy }))
            .with_request_timeout(Duration::from_millis(200))
    }

    pub(crate) async fn body_json(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
