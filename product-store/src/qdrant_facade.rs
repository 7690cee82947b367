//! Thin adapter around `qdrant-client` for the product collection.
//!
//! All Qdrant interactions of the search pipeline go through [`QdrantIndex`]:
//! filtered ANN search on the configured (named) vector, vector size lookup
//! for startup checks, and a health probe.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use ai_llm_service::{RetryError, RetryPolicy, with_retry};
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;
use qdrant_client::qdrant::{PointId, ScoredPoint, SearchParamsBuilder, SearchPointsBuilder, Value as QValue};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::index::{ProductIndex, SearchRequest};
use crate::record::{ProductDocument, ScoredDocument};

/// Qdrant reachability snapshot; never an error.
#[derive(Clone, Debug, Serialize)]
pub struct StoreHealth {
    pub url: String,
    pub collection: String,
    pub ok: bool,
    pub latency_ms: u128,
    pub message: String,
}

/// Product collection backed by Qdrant.
pub struct QdrantIndex {
    client: Qdrant,
    url: String,
    collection: String,
    vector_name: Option<String>,
    retry: RetryPolicy,
}

impl QdrantIndex {
    /// Builds the client; no network call is made here.
    pub fn new(cfg: &StoreConfig) -> Result<Self, StoreError> {
        cfg.validate()?;

        let mut builder = Qdrant::from_url(&cfg.qdrant_url).timeout(cfg.retry.timeout);
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: cfg.qdrant_url.clone(),
            collection: cfg.collection.clone(),
            vector_name: cfg.vector_name.clone(),
            retry: cfg.retry.clone(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Filtered similarity search with the configured retry budget.
    ///
    /// Only [`StoreError::Unavailable`] is retried; a rejected filter is
    /// returned immediately so the caller can fall back.
    pub async fn search(
        &self,
        req: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        with_retry("qdrant.search", &self.retry, cancel, StoreError::is_transient, || {
            self.search_once(req)
        })
        .await
        .map_err(from_retry)
    }

    async fn search_once(&self, req: &SearchRequest) -> Result<Vec<ScoredDocument>, StoreError> {
        let mut builder =
            SearchPointsBuilder::new(&self.collection, req.vector.clone(), req.limit as u64)
                .with_payload(true)
                .params(SearchParamsBuilder::default().hnsw_ef(req.hnsw_ef));
        if let Some(name) = &self.vector_name {
            builder = builder.vector_name(name.clone());
        }
        if let Some(f) = req.filter.as_ref().and_then(|f| f.to_qdrant_filter()) {
            builder = builder.filter(f);
        }

        let started = Instant::now();
        let res = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| StoreError::from_qdrant(e.to_string()))?;

        let mut out = Vec::with_capacity(res.result.len());
        for point in res.result {
            match scored_point_to_doc(point) {
                Ok(hit) => out.push(hit),
                Err(e) => warn!(target: "product_store::qdrant", error = %e, "skipping malformed point"),
            }
        }

        debug!(
            target: "product_store::qdrant",
            collection = %self.collection,
            limit = req.limit,
            hnsw_ef = req.hnsw_ef,
            filtered = req.filter.as_ref().is_some_and(|f| !f.is_empty()),
            hits = out.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "search done"
        );
        Ok(out)
    }

    /// Size of the searched vector as declared by the collection.
    pub async fn vector_size(&self) -> Result<usize, StoreError> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| StoreError::from_qdrant(e.to_string()))?;

        let config = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .ok_or_else(|| StoreError::Config(format!("collection {} has no vector config", self.collection)))?;

        let size = match (config, &self.vector_name) {
            (VectorsConfig::Params(p), None) => p.size,
            (VectorsConfig::ParamsMap(m), Some(name)) => {
                m.map.get(name).map(|p| p.size).ok_or_else(|| {
                    StoreError::Config(format!(
                        "collection {} has no vector named {name}",
                        self.collection
                    ))
                })?
            }
            (VectorsConfig::ParamsMap(m), None) => match m.map.values().next() {
                Some(p) if m.map.len() == 1 => p.size,
                _ => {
                    return Err(StoreError::Config(format!(
                        "collection {} has named vectors; set QDRANT_VECTOR_NAME",
                        self.collection
                    )));
                }
            },
            (VectorsConfig::Params(_), Some(name)) => {
                return Err(StoreError::Config(format!(
                    "collection {} has a single unnamed vector, not {name}",
                    self.collection
                )));
            }
        };
        Ok(size as usize)
    }

    /// Probes the server; failures are reported in the snapshot.
    pub async fn health(&self) -> StoreHealth {
        let started = Instant::now();
        let (ok, message) = match self.client.health_check().await {
            Ok(reply) => (true, format!("qdrant {}", reply.version)),
            Err(e) => (false, e.to_string()),
        };
        let latency_ms = started.elapsed().as_millis();
        info!(target: "product_store::qdrant", url = %self.url, ok, latency_ms = latency_ms as u64, "health probe");

        StoreHealth {
            url: self.url.clone(),
            collection: self.collection.clone(),
            ok,
            latency_ms,
            message,
        }
    }
}

impl ProductIndex for QdrantIndex {
    fn search<'a>(
        &'a self,
        req: &'a SearchRequest,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoredDocument>, StoreError>> + Send + 'a>> {
        Box::pin(QdrantIndex::search(self, req, cancel))
    }

    fn vector_size<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<usize, StoreError>> + Send + 'a>> {
        Box::pin(QdrantIndex::vector_size(self))
    }
}

pub(crate) fn from_retry(e: RetryError<StoreError>) -> StoreError {
    match e {
        RetryError::Cancelled => StoreError::Cancelled,
        RetryError::Exhausted { last, .. } => match last {
            ai_llm_service::Attempt::Failed(inner) => inner,
            ai_llm_service::Attempt::TimedOut(d) => {
                StoreError::Unavailable(format!("request timed out after {d:?}"))
            }
        },
    }
}

fn point_id_to_string(id: Option<&PointId>) -> String {
    match id.and_then(|pid| pid.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

fn payload_to_json(payload: HashMap<String, QValue>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> =
        payload.into_iter().map(|(k, v)| (k, v.into_json())).collect();
    serde_json::Value::Object(map)
}

fn scored_point_to_doc(point: ScoredPoint) -> Result<ScoredDocument, StoreError> {
    let id = point_id_to_string(point.id.as_ref());
    let doc = ProductDocument::from_payload(&id, payload_to_json(point.payload))?;
    Ok(ScoredDocument {
        score: point.score,
        doc,
    })
}
