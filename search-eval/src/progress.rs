//! Progress reporting for evaluation runs.
//!
//! The harness reports every finished query; the CLI renders a bar with
//! running scored/failed counts, servers and tests use [`NoopProgress`].

use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

use crate::report::{QueryEvaluation, QueryStatus};

/// Observer of an evaluation run. Called from concurrent workers.
pub trait Progress: Send + Sync {
    fn query_finished(&self, _entry: &QueryEvaluation) {}
    fn run_finished(&self, _scored: usize, _failed: usize) {}
}

#[derive(Default, Clone, Copy)]
pub struct NoopProgress;
impl Progress for NoopProgress {}

/// Terminal bar over the query set.
pub struct IndicatifProgress {
    pb: ProgressBar,
    failed: AtomicUsize,
}

impl IndicatifProgress {
    pub fn bar(queries: u64) -> Self {
        let pb = ProgressBar::new(queries);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.green/white} {pos}/{len} failed={prefix} {wide_msg}")
        {
            pb.set_style(style);
        }
        pb.set_prefix("0");
        Self {
            pb,
            failed: AtomicUsize::new(0),
        }
    }
}

impl Progress for IndicatifProgress {
    fn query_finished(&self, entry: &QueryEvaluation) {
        if entry.status == QueryStatus::Failed {
            let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
            self.pb.set_prefix(failed.to_string());
        }
        self.pb.set_message(entry.query.clone());
        self.pb.inc(1);
    }

    fn run_finished(&self, scored: usize, failed: usize) {
        self.pb.finish_with_message(format!("{scored} scored, {failed} failed"));
    }
}
