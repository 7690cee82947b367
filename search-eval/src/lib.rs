//! Offline evaluation of the search pipeline.
//!
//! Loads a labeled query set, runs every query through a [`QueryRunner`]
//! with bounded concurrency, scores the ranked ids (P/R/F1/nDCG@k, MRR) and
//! writes a timestamped JSON report.

pub mod dataset;
pub mod errors;
pub mod harness;
pub mod metrics;
pub mod progress;
pub mod report;

pub use dataset::{LabeledQuery, load_dataset, parse_dataset};
pub use errors::{EvalError, Result};
pub use harness::{EvalConfig, EvaluationHarness, QueryRunner, RunOutput};
pub use metrics::MetricMap;
pub use progress::{IndicatifProgress, NoopProgress, Progress};
pub use report::{EvalReport, QueryEvaluation, QueryStatus, TypeSummary};
