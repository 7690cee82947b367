//! Evaluation report: per-query entries, aggregates and persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::{EvalError, Result};
use crate::metrics::{MetricMap, mean};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Scored,
    /// Pipeline error or timeout; every metric is 0.
    Failed,
}

/// Outcome of one labeled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvaluation {
    /// Position in the input set.
    pub index: usize,
    pub query: String,
    pub query_type: String,
    pub status: QueryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub semantic_query: String,
    #[serde(default)]
    pub filters: serde_json::Value,
    #[serde(default)]
    pub confidence: f32,
    /// Extraction failed and the search ran without filters.
    #[serde(default)]
    pub degraded: bool,
    pub metrics: MetricMap,
    /// Names of the top five hits.
    #[serde(default)]
    pub retrieved: Vec<String>,
    #[serde(default)]
    pub retrieved_ids: Vec<String>,
    pub expected_ids: Vec<String>,
    #[serde(default)]
    pub expected_names: Vec<String>,
    pub latency_ms: u64,
}

/// Aggregate for one `query_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub queries: usize,
    pub failed: usize,
    pub metrics: MetricMap,
}

/// Full run report, keyed by run id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Free-form description of the evaluated configuration.
    pub context: BTreeMap<String, String>,
    pub k_values: Vec<usize>,
    pub total_queries: usize,
    pub scored: usize,
    pub failed: usize,
    /// Means over every query; failed queries count as 0.
    pub global_metrics: MetricMap,
    pub metrics_by_type: BTreeMap<String, TypeSummary>,
    pub details: Vec<QueryEvaluation>,
}

impl EvalReport {
    /// Aggregates `details` (sorted by input index) into a new report.
    pub fn new(
        context: BTreeMap<String, String>,
        k_values: Vec<usize>,
        mut details: Vec<QueryEvaluation>,
    ) -> Self {
        details.sort_by_key(|d| d.index);
        let failed = details.iter().filter(|d| d.status == QueryStatus::Failed).count();

        let mut by_type: BTreeMap<String, Vec<&QueryEvaluation>> = BTreeMap::new();
        for d in &details {
            by_type.entry(d.query_type.clone()).or_default().push(d);
        }
        let metrics_by_type = by_type
            .into_iter()
            .map(|(t, entries)| {
                let summary = TypeSummary {
                    queries: entries.len(),
                    failed: entries.iter().filter(|d| d.status == QueryStatus::Failed).count(),
                    metrics: mean(entries.iter().map(|d| &d.metrics), &k_values),
                };
                (t, summary)
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            context,
            global_metrics: mean(details.iter().map(|d| &d.metrics), &k_values),
            total_queries: details.len(),
            scored: details.len() - failed,
            failed,
            k_values,
            metrics_by_type,
            details,
        }
    }

    /// File name: `eval_<UTC timestamp>_<run id>.json`.
    pub fn file_name(&self) -> String {
        format!(
            "eval_{}_{}.json",
            self.timestamp.format("%Y%m%dT%H%M%SZ"),
            self.run_id.simple()
        )
    }

    /// Writes the report as pretty JSON under `dir` (created if missing).
    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let io = |source| EvalError::Io {
            path: dir.display().to_string(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io)?;
        let path = dir.join(self.file_name());
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, body).map_err(io)?;

        info!(target: "search_eval::report", path = %path.display(), run_id = %self.run_id, "report written");
        Ok(path)
    }
}
