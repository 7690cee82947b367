//! Query text → ranked [`ResultItem`]s.
//!
//! Per request: extract filters (or take the caller's raw override), embed the
//! semantic remainder, assemble, search with an over-fetched candidate set,
//! then re-check every hit against the filter client-side, drop hits below
//! the score floor, sort by (score desc, id asc), and truncate.
//!
//! Extraction failure degrades to pure vector search. Embedding or store
//! failure after retries is returned as [`PipelineError::UpstreamUnavailable`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use ai_llm_service::ProviderSlot;
use filter_agent::{DroppedValue, ExtractionError, FilterExtractionAgent, FilterSchema};
use product_store::{EmbeddingsProvider, ProductIndex, ScoredDocument, StoreError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assembler::{AssemblyStats, ExecutableQuery, QueryAssembler};
use crate::config::ExecutorConfig;
use crate::errors::{PipelineError, Result};

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Requested result count; defaulted and capped by [`ExecutorConfig`].
    pub limit: Option<usize>,
    /// Diagnostic override: use this schema instead of calling the agent.
    pub raw_filter: Option<FilterSchema>,
    /// Aborts in-flight LLM, embedding and store calls.
    pub cancel: CancellationToken,
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    /// 1-based; strictly increasing as score decreases.
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub score: f32,
    /// Stored `{key: value}` of every attribute predicate the hit satisfied.
    pub matched_attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// How the filter schema of a request was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionInfo {
    /// Slot whose answer was used; `None` when degraded or bypassed.
    pub slot: Option<ProviderSlot>,
    /// Both providers failed; the request ran as pure vector search.
    pub degraded: bool,
    /// Caller supplied the schema.
    pub bypassed: bool,
    /// Filters were cleared by the confidence gate.
    pub low_confidence: bool,
    pub dropped_values: Vec<DroppedValue>,
}

/// Ranked items plus diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub items: Vec<ResultItem>,
    pub schema: FilterSchema,
    pub extraction: ExtractionInfo,
    pub assembly: AssemblyStats,
    /// The store refused the server-side filter; filtering ran client-side only.
    pub filter_fallback: bool,
    pub latency_ms: u64,
}

/// Orchestrates agent, embedder, assembler and index.
pub struct QueryExecutor {
    agent: Arc<FilterExtractionAgent>,
    assembler: QueryAssembler,
    embedder: Arc<dyn EmbeddingsProvider>,
    index: Arc<dyn ProductIndex>,
    cfg: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(
        agent: Arc<FilterExtractionAgent>,
        assembler: QueryAssembler,
        embedder: Arc<dyn EmbeddingsProvider>,
        index: Arc<dyn ProductIndex>,
        cfg: ExecutorConfig,
    ) -> Self {
        Self {
            agent,
            assembler,
            embedder,
            index,
            cfg,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.cfg
    }

    /// Runs one search.
    ///
    /// # Errors
    /// - [`PipelineError::EmptyQuery`] for blank input
    /// - [`PipelineError::Cancelled`] when `options.cancel` fires
    /// - [`PipelineError::UpstreamUnavailable`] when embedding or search fails
    ///   after retries
    /// - [`PipelineError::EmbeddingMismatch`] when the embedder returns a
    ///   vector of the wrong size
    pub async fn execute(&self, query: &str, options: SearchOptions) -> Result<SearchResponse> {
        let started = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }
        let cancel = &options.cancel;
        let limit = self.cfg.effective_limit(options.limit);

        let (schema, extraction) = match options.raw_filter {
            Some(raw) => (bypass_schema(raw, query), ExtractionInfo::bypassed()),
            None => self.extract(query, cancel).await?,
        };

        let embedding = self
            .embedder
            .embed(&schema.semantic_query, cancel)
            .await
            .map_err(|e| upstream("embedding", e))?;

        let fetch = limit.saturating_mul(self.cfg.oversample);
        let query_plan = self
            .assembler
            .build(&schema, embedding)
            .scoped(fetch, self.candidates(fetch));

        let (hits, filter_fallback) = self.search(&query_plan, cancel).await?;
        let fetched = hits.len();
        let items = self.rank(&query_plan, hits, limit);

        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            target: "search_pipeline::execute",
            query = %query,
            limit,
            predicates = query_plan.stats.predicates,
            dropped = query_plan.stats.dropped,
            fetched,
            returned = items.len(),
            degraded = extraction.degraded,
            filter_fallback,
            latency_ms,
            "search complete"
        );

        Ok(SearchResponse {
            items,
            schema,
            extraction,
            assembly: query_plan.stats,
            filter_fallback,
            latency_ms,
        })
    }

    async fn extract(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<(FilterSchema, ExtractionInfo)> {
        match self.agent.extract_detailed(query, cancel).await {
            Ok(e) => Ok((
                e.schema,
                ExtractionInfo {
                    slot: Some(e.slot),
                    degraded: false,
                    bypassed: false,
                    low_confidence: e.low_confidence,
                    dropped_values: e.dropped,
                },
            )),
            Err(ExtractionError::Cancelled) => Err(PipelineError::Cancelled),
            Err(ExtractionError::EmptyQuery) => Err(PipelineError::EmptyQuery),
            Err(e) => {
                warn!(target: "search_pipeline::execute", error = %e, "extraction unavailable; pure vector search");
                let schema = e
                    .degraded_schema()
                    .cloned()
                    .unwrap_or_else(|| FilterSchema::passthrough(query));
                Ok((schema, ExtractionInfo::degraded()))
            }
        }
    }

    async fn search(
        &self,
        plan: &ExecutableQuery,
        cancel: &CancellationToken,
    ) -> Result<(Vec<ScoredDocument>, bool)> {
        match self.index.search(&plan.to_request(true), cancel).await {
            Ok(hits) => Ok((hits, false)),
            Err(StoreError::FilterRejected(reason)) => {
                let fetch = plan.vector.limit.saturating_mul(self.cfg.fallback_factor);
                warn!(
                    target: "search_pipeline::execute",
                    %reason,
                    fetch,
                    "server-side filter rejected; filtering client-side"
                );
                let wide = plan.clone().scoped(fetch, self.candidates(fetch));
                let hits = self
                    .index
                    .search(&wide.to_request(false), cancel)
                    .await
                    .map_err(|e| upstream("vector store", e))?;
                Ok((hits, true))
            }
            Err(e) => Err(upstream("vector store", e)),
        }
    }

    fn candidates(&self, fetch: usize) -> u64 {
        self.cfg.min_candidates.max(fetch as u64 * 2)
    }

    fn rank(&self, plan: &ExecutableQuery, mut hits: Vec<ScoredDocument>, limit: usize) -> Vec<ResultItem> {
        let before = hits.len();
        hits.retain(|h| {
            h.score.is_finite()
                && self.cfg.min_score.is_none_or(|min| h.score >= min)
                && plan.filter.matches(&h.doc)
        });
        if hits.len() < before {
            info!(
                target: "search_pipeline::execute",
                removed = before - hits.len(),
                "hits removed by client-side re-check"
            );
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc.id.cmp(&b.doc.id)));
        let mut seen = HashSet::new();
        hits.retain(|h| seen.insert(h.doc.id.clone()));
        hits.truncate(limit);

        hits.into_iter()
            .enumerate()
            .map(|(i, h)| ResultItem {
                rank: i + 1,
                matched_attributes: plan.filter.matched_attributes(&h.doc).into_iter().collect(),
                score: h.score,
                id: h.doc.id,
                name: h.doc.name,
                brand: h.doc.brand,
                price: h.doc.price,
                currency: h.doc.currency,
            })
            .collect()
    }
}

impl ExtractionInfo {
    fn degraded() -> Self {
        Self {
            slot: None,
            degraded: true,
            bypassed: false,
            low_confidence: false,
            dropped_values: Vec::new(),
        }
    }

    fn bypassed() -> Self {
        Self {
            slot: None,
            degraded: false,
            bypassed: true,
            low_confidence: false,
            dropped_values: Vec::new(),
        }
    }
}

fn bypass_schema(mut raw: FilterSchema, query: &str) -> FilterSchema {
    if raw.semantic_query.trim().is_empty() {
        raw.semantic_query = query.to_string();
    }
    raw
}

fn upstream(service: &'static str, e: StoreError) -> PipelineError {
    match e {
        StoreError::Cancelled => PipelineError::Cancelled,
        StoreError::VectorSizeMismatch { got, want } => {
            PipelineError::EmbeddingMismatch(format!("query vector has {got} dimensions, corpus has {want}"))
        }
        StoreError::Config(detail) => PipelineError::Config(detail),
        other => PipelineError::UpstreamUnavailable {
            service,
            detail: other.to_string(),
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    use ai_llm_service::{AiLlmError, Attempt, RetryError};
    use filter_agent::{AgentConfig, AttributeVocabulary, CompletionSource, Prompt};
    use product_store::{ProductDocument, SearchRequest};
    use serde_json::json;

    use super::*;

    /// Completion source answering every prompt with one fixed reply.
    pub(crate) struct FixedSource(pub Option<String>);

    impl CompletionSource for FixedSource {
        fn has_secondary(&self) -> bool {
            true
        }

        fn complete<'a>(
            &'a self,
            _slot: ProviderSlot,
            _prompt: &'a Prompt,
            _cancel: &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<String, RetryError<AiLlmError>>> + Send + 'a>>
        {
            let reply = self.0.clone().ok_or(RetryError::Exhausted {
                attempts: 2,
                last: Attempt::TimedOut(Duration::from_secs(30)),
            });
            Box::pin(async move { reply })
        }
    }

    pub(crate) struct FakeEmbedder {
        pub dim: usize,
        pub fail: bool,
    }

    impl EmbeddingsProvider for FakeEmbedder {
        fn model(&self) -> &str {
            "text-embedding-004"
        }

        fn embed<'a>(
            &'a self,
            _text: &'a str,
            cancel: &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<Vec<f32>, StoreError>> + Send + 'a>> {
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return Err(StoreError::Cancelled);
                }
                if self.fail {
                    return Err(StoreError::Embedding("connection refused".into()));
                }
                Ok(vec![0.5; self.dim])
            })
        }
    }

    /// In-memory index returning a fixed hit list and recording requests.
    ///
    /// Ignores the filter unless `honour_filter` is set, which lets tests
    /// check the client-side re-check.
    pub(crate) struct FakeIndex {
        pub hits: Vec<ScoredDocument>,
        pub reject_filter: bool,
        pub honour_filter: bool,
        pub dim: usize,
        pub requests: Mutex<Vec<SearchRequest>>,
    }

    impl FakeIndex {
        pub(crate) fn new(hits: Vec<ScoredDocument>) -> Self {
            Self {
                hits,
                reject_filter: false,
                honour_filter: false,
                dim: 4,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProductIndex for FakeIndex {
        fn search<'a>(
            &'a self,
            req: &'a SearchRequest,
            _cancel: &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<Vec<ScoredDocument>, StoreError>> + Send + 'a>>
        {
            self.requests.lock().unwrap().push(req.clone());
            let out = if self.reject_filter && req.filter.is_some() {
                Err(StoreError::FilterRejected("Index required but not found".into()))
            } else {
                let mut hits: Vec<ScoredDocument> = match (&req.filter, self.honour_filter) {
                    (Some(f), true) => self.hits.iter().filter(|h| f.matches(&h.doc)).cloned().collect(),
                    _ => self.hits.clone(),
                };
                hits.truncate(req.limit);
                Ok(hits)
            };
            Box::pin(async move { out })
        }

        fn vector_size<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<usize, StoreError>> + Send + 'a>> {
            Box::pin(async move { Ok(self.dim) })
        }
    }

    pub(crate) fn hit(id: &str, score: f32, color: &str) -> ScoredDocument {
        ScoredDocument {
            score,
            doc: ProductDocument::from_payload(
                id,
                json!({
                    "id": id,
                    "name": format!("Vase {color}"),
                    "categories": ["Vase"],
                    "price": {"amount": 10000.0, "currency": "XOF"},
                    "attributes": [{"key": "couleur", "value": color}]
                }),
            )
            .unwrap(),
        }
    }

    fn executor(reply: Option<&str>, index: Arc<FakeIndex>, cfg: ExecutorConfig) -> QueryExecutor {
        let vocab = Arc::new(AttributeVocabulary::french().unwrap());
        let agent = FilterExtractionAgent::new(
            Arc::new(FixedSource(reply.map(str::to_string))),
            vocab.clone(),
            AgentConfig::default(),
        );
        QueryExecutor::new(
            Arc::new(agent),
            QueryAssembler::new(vocab, None),
            Arc::new(FakeEmbedder { dim: 4, fail: false }),
            index,
            cfg,
        )
    }

    const NOIR: &str = r#"{"semantic_query": "vase", "filters": {"color": "noir"}, "confidence": 0.9}"#;

    #[tokio::test]
    async fn client_side_recheck_removes_filter_violations() {
        let index = Arc::new(FakeIndex::new(vec![
            hit("b", 0.91, "Blanc"),
            hit("a", 0.90, "Noir"),
            hit("c", 0.80, "NOIR"),
        ]));
        let exec = executor(Some(NOIR), index.clone(), ExecutorConfig::default());

        let out = exec.execute("vase noir", SearchOptions::default()).await.unwrap();

        let ids: Vec<_> = out.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(out.items[0].matched_attributes.get("couleur").map(String::as_str), Some("Noir"));
        assert_eq!(out.assembly.predicates, 1);

        let req = index.requests.lock().unwrap()[0].clone();
        assert_eq!(req.limit, 40);
        assert_eq!(req.hnsw_ef, 150);
        assert!(req.filter.is_some());
    }

    #[tokio::test]
    async fn ties_are_broken_by_id_and_ranks_follow_scores() {
        let index = Arc::new(FakeIndex::new(vec![
            hit("z", 0.7, "Noir"),
            hit("m", 0.9, "Noir"),
            hit("a", 0.7, "Noir"),
        ]));
        let exec = executor(Some(NOIR), index, ExecutorConfig::default());

        let out = exec.execute("vase noir", SearchOptions::default()).await.unwrap();

        let ranked: Vec<_> = out.items.iter().map(|i| (i.rank, i.id.as_str())).collect();
        assert_eq!(ranked, vec![(1, "m"), (2, "a"), (3, "z")]);
    }

    #[tokio::test]
    async fn limit_is_capped_by_config() {
        let hits = (0..30).map(|i| hit(&format!("p{i:02}"), 0.9, "Noir")).collect();
        let cfg = ExecutorConfig {
            max_limit: 5,
            default_limit: 5,
            ..ExecutorConfig::default()
        };
        let exec = executor(Some(NOIR), Arc::new(FakeIndex::new(hits)), cfg);

        let out = exec
            .execute(
                "vase noir",
                SearchOptions {
                    limit: Some(1000),
                    ..SearchOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.items.len(), 5);
    }

    #[tokio::test]
    async fn extraction_failure_degrades_to_vector_search() {
        let index = Arc::new(FakeIndex::new(vec![hit("a", 0.8, "Blanc"), hit("b", 0.7, "Noir")]));
        let exec = executor(None, index.clone(), ExecutorConfig::default());

        let out = exec.execute("vase noir", SearchOptions::default()).await.unwrap();

        assert!(out.extraction.degraded);
        assert_eq!(out.items.len(), 2);
        assert_eq!(out.schema.semantic_query, "vase noir");
        assert!(index.requests.lock().unwrap()[0].filter.is_none());
    }

    #[tokio::test]
    async fn out_of_vocabulary_attribute_is_dropped() {
        let reply = r#"{"semantic_query": "vase", "filters": {"color": "noir", "finish": "matte"}, "confidence": 0.9}"#;
        let index = Arc::new(FakeIndex::new(vec![hit("a", 0.8, "Noir")]));
        let exec = executor(Some(reply), index, ExecutorConfig::default());

        let out = exec.execute("vase noir finition mate", SearchOptions::default()).await.unwrap();

        assert_eq!(out.assembly.dropped, 1);
        assert_eq!(out.assembly.predicates, 1);
        assert_eq!(out.items.len(), 1);
    }

    #[tokio::test]
    async fn rejected_filter_falls_back_to_wider_unfiltered_search() {
        let mut index = FakeIndex::new(vec![hit("a", 0.9, "Blanc"), hit("b", 0.8, "Noir")]);
        index.reject_filter = true;
        let index = Arc::new(index);
        let exec = executor(Some(NOIR), index.clone(), ExecutorConfig::default());

        let out = exec.execute("vase noir", SearchOptions::default()).await.unwrap();

        assert!(out.filter_fallback);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].id, "b");
        let reqs = index.requests.lock().unwrap();
        assert_eq!(reqs.len(), 2);
        assert!(reqs[1].filter.is_none());
        assert_eq!(reqs[1].limit, 120);
        assert_eq!(reqs[1].hnsw_ef, 240);
    }

    #[tokio::test]
    async fn min_score_and_raw_filter_override() {
        let index = Arc::new(FakeIndex::new(vec![hit("a", 0.9, "Blanc"), hit("b", 0.4, "Blanc")]));
        let cfg = ExecutorConfig {
            min_score: Some(0.5),
            ..ExecutorConfig::default()
        };
        let exec = executor(None, index, cfg);
        let raw = FilterSchema {
            color: Some("blanc".into()),
            ..FilterSchema::default()
        };

        let out = exec
            .execute(
                "vase",
                SearchOptions {
                    raw_filter: Some(raw),
                    ..SearchOptions::default()
                },
            )
            .await
            .unwrap();

        assert!(out.extraction.bypassed);
        assert_eq!(out.schema.semantic_query, "vase");
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].id, "a");
    }

    #[tokio::test]
    async fn embedding_outage_is_upstream_unavailable() {
        let vocab = Arc::new(AttributeVocabulary::french().unwrap());
        let agent = FilterExtractionAgent::new(Arc::new(FixedSource(Some(NOIR.into()))), vocab.clone(), AgentConfig::default());
        let exec = QueryExecutor::new(
            Arc::new(agent),
            QueryAssembler::new(vocab, None),
            Arc::new(FakeEmbedder { dim: 4, fail: true }),
            Arc::new(FakeIndex::new(vec![])),
            ExecutorConfig::default(),
        );

        let err = exec.execute("vase noir", SearchOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable { service: "embedding", .. }));
    }

    #[tokio::test]
    async fn zero_matches_is_an_empty_result() {
        let exec = executor(Some(NOIR), Arc::new(FakeIndex::new(vec![])), ExecutorConfig::default());
        let out = exec.execute("vase noir", SearchOptions::default()).await.unwrap();
        assert!(out.items.is_empty());
    }

    #[tokio::test]
    async fn empty_query_and_cancellation() {
        let exec = executor(Some(NOIR), Arc::new(FakeIndex::new(vec![])), ExecutorConfig::default());
        assert!(matches!(
            exec.execute("   ", SearchOptions::default()).await,
            Err(PipelineError::EmptyQuery)
        ));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = exec
            .execute(
                "vase",
                SearchOptions {
                    raw_filter: Some(FilterSchema::default()),
                    cancel,
                    ..SearchOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
