use crate::config::llm_model_config::LlmModelConfig;
use crate::error_handler::Result;
use crate::retry::RetryPolicy;

/// Everything needed to build [`crate::LlmServiceProfiles`].
///
/// Built once at the edge (see [`crate::config::default_config::profiles_from_env`])
/// or by hand in tests; several instances may coexist in one process.
#[derive(Debug, Clone)]
pub struct LlmProfilesConfig {
    /// Completion model asked first.
    pub primary: LlmModelConfig,
    /// Fallback completion model with the same output contract.
    pub secondary: Option<LlmModelConfig>,
    /// Query embedding model; must match the corpus embedding model.
    pub embedding: LlmModelConfig,
    /// Retry budget applied to every completion and embedding call.
    pub retry: RetryPolicy,
    /// Client timeout for health probes, in seconds.
    pub health_timeout_secs: Option<u64>,
}

impl LlmProfilesConfig {
    /// Validates every configured slot.
    pub fn validate(&self) -> Result<()> {
        self.primary.validate()?;
        if let Some(s) = &self.secondary {
            s.validate()?;
        }
        self.embedding.validate()
    }
}
