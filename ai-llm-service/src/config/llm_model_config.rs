use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{Result, validate_http_endpoint, validate_range_f32, ConfigError};

/// Configuration for one model invocation slot.
///
/// The same struct describes completion and embedding models; fields that do
/// not apply to a call (e.g. `temperature` for embeddings) are ignored by the
/// provider client.
///
/// # Examples
///
/// ```
/// use ai_llm_service::{LlmModelConfig, LlmProvider};
///
/// let cfg = LlmModelConfig {
///     provider: LlmProvider::Gemini,
///     model: "gemini-2.5-flash".to_string(),
///     endpoint: "https://generativelanguage.googleapis.com".to_string(),
///     api_key: Some("key".to_string()),
///     max_tokens: Some(1024),
///     temperature: Some(0.1),
///     top_p: None,
///     timeout_secs: Some(30),
///     json_mode: true,
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// Backend serving this model.
    pub provider: LlmProvider,

    /// Model identifier (e.g. `"gemini-2.5-flash"`, `"text-embedding-004"`).
    pub model: String,

    /// Base URL of the provider API, without the route suffix.
    pub endpoint: String,

    /// API key for providers that require one.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// HTTP request timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Ask the provider for a JSON-only response body.
    pub json_mode: bool,
}

impl LlmModelConfig {
    /// Checks the fields that would otherwise only fail on the first request.
    ///
    /// # Errors
    /// Returns [`crate::AiLlmError::Config`] for an empty model, a non-HTTP
    /// endpoint, a missing API key, or sampling parameters out of range.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        validate_http_endpoint("endpoint", self.endpoint.trim())?;
        if self.provider.requires_api_key()
            && self.api_key.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingApiKey(self.provider.to_string()).into());
        }
        if let Some(t) = self.temperature {
            validate_range_f32("temperature", t, 0.0, 2.0)?;
        }
        if let Some(p) = self.top_p {
            validate_range_f32("top_p", p, 0.0, 1.0)?;
        }
        Ok(())
    }

    /// Endpoint with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }
}
