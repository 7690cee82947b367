//! Runs a labeled query set through the pipeline with bounded concurrency.
//!
//! Each query gets its own timeout and child cancellation token. A failing
//! or timed-out query is recorded with zero scores; it never aborts the run.
//! Workers finish out of order and append to a mutex-guarded accumulator;
//! the report is sorted back into input order.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ai_llm_service::error_handler::{env_opt, env_opt_u32, env_opt_u64};
use futures::StreamExt;
use search_pipeline::{SearchOptions, SearchPipeline};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dataset::LabeledQuery;
use crate::errors::{EvalError, Result};
use crate::metrics::{score, zero};
use crate::progress::Progress;
use crate::report::{EvalReport, QueryEvaluation, QueryStatus};

/// Harness tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    /// Queries in flight at once.
    pub concurrency: usize,
    /// Upper bound for one query, extraction and search included.
    pub query_timeout: Duration,
    /// Cut-offs for P/R/F1/nDCG; the largest one is the search limit.
    pub k_values: Vec<usize>,
    pub output_dir: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            query_timeout: Duration::from_secs(60),
            k_values: vec![5, 10],
            output_dir: PathBuf::from("eval_reports"),
        }
    }
}

impl EvalConfig {
    /// Reads `EVAL_CONCURRENCY`, `EVAL_QUERY_TIMEOUT_SECS` and `EVAL_OUTPUT_DIR`.
    pub fn from_env() -> Result<Self> {
        let cfg_err = |e: ai_llm_service::AiLlmError| EvalError::Config(e.to_string());
        let mut cfg = Self::default();
        if let Some(n) = env_opt_u32("EVAL_CONCURRENCY").map_err(cfg_err)? {
            cfg.concurrency = n as usize;
        }
        if let Some(secs) = env_opt_u64("EVAL_QUERY_TIMEOUT_SECS").map_err(cfg_err)? {
            cfg.query_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = env_opt("EVAL_OUTPUT_DIR") {
            cfg.output_dir = PathBuf::from(dir);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(EvalError::Config("concurrency must be > 0".into()));
        }
        if self.query_timeout.is_zero() {
            return Err(EvalError::Config("query timeout must be > 0".into()));
        }
        if self.k_values.is_empty() || self.k_values.contains(&0) {
            return Err(EvalError::Config("k values must be non-empty and > 0".into()));
        }
        Ok(())
    }

    fn limit(&self) -> usize {
        self.k_values.iter().copied().max().unwrap_or(10)
    }
}

/// What the harness needs from one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub retrieved_ids: Vec<String>,
    pub retrieved_names: Vec<String>,
    pub semantic_query: String,
    pub filters: serde_json::Value,
    pub confidence: f32,
    pub degraded: bool,
}

/// Something that answers a query with ranked ids.
pub trait QueryRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<RunOutput, String>> + Send + 'a>>;
}

impl QueryRunner for SearchPipeline {
    fn run<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<RunOutput, String>> + Send + 'a>> {
        Box::pin(async move {
            let options = SearchOptions {
                limit: Some(limit),
                raw_filter: None,
                cancel: cancel.clone(),
            };
            let resp = self.execute(query, options).await.map_err(|e| e.to_string())?;
            let mut filters = serde_json::to_value(&resp.schema).unwrap_or_default();
            if let Some(obj) = filters.as_object_mut() {
                obj.remove("semantic_query");
                obj.remove("confidence");
            }
            Ok(RunOutput {
                retrieved_ids: resp.items.iter().map(|i| i.id.clone()).collect(),
                retrieved_names: resp.items.iter().map(|i| i.name.clone()).collect(),
                semantic_query: resp.schema.semantic_query,
                filters,
                confidence: resp.schema.confidence,
                degraded: resp.extraction.degraded,
            })
        })
    }
}

pub struct EvaluationHarness {
    runner: Arc<dyn QueryRunner>,
    cfg: EvalConfig,
    context: BTreeMap<String, String>,
}

impl EvaluationHarness {
    pub fn new(runner: Arc<dyn QueryRunner>, cfg: EvalConfig) -> Self {
        Self {
            runner,
            cfg,
            context: BTreeMap::new(),
        }
    }

    /// Adds a `key: value` pair describing the evaluated configuration.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.cfg
    }

    /// Scores every query and aggregates the report. Never fails.
    ///
    /// Cancelling `cancel` makes the remaining queries fail fast.
    pub async fn evaluate(
        &self,
        queries: Vec<LabeledQuery>,
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> EvalReport {
        let started = Instant::now();
        let total = queries.len();
        let acc: Arc<Mutex<Vec<QueryEvaluation>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));

        let sink = Arc::clone(&acc);
        futures::stream::iter(queries.into_iter().enumerate())
            .for_each_concurrent(self.cfg.concurrency.max(1), move |(index, q)| {
                let acc = Arc::clone(&sink);
                async move {
                    let entry = self.evaluate_one(index, q, cancel).await;
                    progress.query_finished(&entry);
                    acc.lock().await.push(entry);
                }
            })
            .await;

        let details = std::mem::take(&mut *acc.lock().await);
        let report = EvalReport::new(self.context.clone(), self.cfg.k_values.clone(), details);
        progress.run_finished(report.scored, report.failed);

        info!(
            target: "search_eval::run",
            run_id = %report.run_id,
            queries = report.total_queries,
            failed = report.failed,
            mrr = report.global_metrics.get("mrr").copied().unwrap_or(0.0),
            latency_ms = started.elapsed().as_millis() as u64,
            "evaluation finished"
        );
        report
    }

    async fn evaluate_one(&self, index: usize, q: LabeledQuery, cancel: &CancellationToken) -> QueryEvaluation {
        let started = Instant::now();
        let token = cancel.child_token();
        let outcome = tokio::time::timeout(
            self.cfg.query_timeout,
            self.runner.run(&q.query, self.cfg.limit(), &token),
        )
        .await;

        let result = match outcome {
            Ok(r) => r,
            Err(_) => {
                token.cancel();
                Err(format!("timed out after {:?}", self.cfg.query_timeout))
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(out) => QueryEvaluation {
                index,
                metrics: score(&out.retrieved_ids, &q.relevant_ids, &self.cfg.k_values),
                status: QueryStatus::Scored,
                error: None,
                semantic_query: out.semantic_query,
                filters: out.filters,
                confidence: out.confidence,
                degraded: out.degraded,
                retrieved: out.retrieved_names.into_iter().take(5).collect(),
                retrieved_ids: out.retrieved_ids,
                query: q.query,
                query_type: q.query_type,
                expected_ids: q.relevant_ids,
                expected_names: q.relevant_names,
                latency_ms,
            },
            Err(error) => {
                warn!(target: "search_eval::run", index, query = %q.query, %error, "query failed; scored as zero");
                QueryEvaluation {
                    index,
                    metrics: zero(&self.cfg.k_values),
                    status: QueryStatus::Failed,
                    error: Some(error),
                    semantic_query: String::new(),
                    filters: serde_json::Value::Null,
                    confidence: 0.0,
                    degraded: false,
                    retrieved: Vec::new(),
                    retrieved_ids: Vec::new(),
                    query: q.query,
                    query_type: q.query_type,
                    expected_ids: q.relevant_ids,
                    expected_names: q.relevant_names,
                    latency_ms,
                }
            }
        }
    }
}
