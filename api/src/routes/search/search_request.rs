use filter_agent::FilterSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Defaulted and capped by the executor.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Diagnostic override; skips LLM extraction when present.
    #[serde(default)]
    pub filters: Option<FilterSchema>,
}
