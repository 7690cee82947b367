use ai_llm_service::ProviderSlot;
use filter_agent::{DroppedValue, FilterSchema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub query: String,
    pub schema: FilterSchema,
    /// `None` when both providers failed.
    pub slot: Option<ProviderSlot>,
    /// Extraction was unavailable; `schema` is the pass-through fallback.
    pub degraded: bool,
    pub low_confidence: bool,
    pub dropped_values: Vec<DroppedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
