//! Shared LLM service with three slots: `primary`, `secondary` and `embedding`.
//!
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Provider clients are built eagerly, so a bad slot fails at startup rather
//!   than on the first request.
//! - The two completion slots share one output contract; which one answered
//!   is reported through [`ProviderSlot`] so callers can log and test the
//!   fallback path.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::{LlmServiceProfiles, ProviderSlot};
//! use ai_llm_service::config::default_config::profiles_from_env;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let svc = Arc::new(LlmServiceProfiles::new(profiles_from_env()?)?);
//! let cancel = CancellationToken::new();
//! let text = svc.complete(ProviderSlot::Primary, "vase noir", None, &cancel).await?;
//! let emb = svc.embed_query("vase noir", &cancel).await?;
//! println!("{text} / dim={}", emb.len());
//! # Ok(()) }
//! ```

use std::fmt;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    config::{
        default_config::profiles_from_env, llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider, profiles_config::LlmProfilesConfig,
    },
    error_handler::{AiLlmError, Result},
    health_service::{HealthService, HealthStatus},
    retry::{RetryError, RetryPolicy, with_retry},
    services::{
        gemini_service::GeminiService, ollama_service::OllamaService,
        open_ai_service::OpenAiService,
    },
};

/// Completion slot selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSlot {
    Primary,
    Secondary,
}

impl ProviderSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderSlot::Primary => "primary",
            ProviderSlot::Secondary => "secondary",
        }
    }
}

impl fmt::Display for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider client behind a slot.
#[derive(Debug)]
enum ProviderClient {
    Ollama(OllamaService),
    OpenAI(OpenAiService),
    Gemini(GeminiService),
}

impl ProviderClient {
    fn new(cfg: &LlmModelConfig) -> Result<Self> {
        Ok(match cfg.provider {
            LlmProvider::Ollama => ProviderClient::Ollama(OllamaService::new(cfg.clone())?),
            LlmProvider::OpenAI => ProviderClient::OpenAI(OpenAiService::new(cfg.clone())?),
            LlmProvider::Gemini => ProviderClient::Gemini(GeminiService::new(cfg.clone())?),
        })
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        match self {
            ProviderClient::Ollama(c) => c.generate(prompt, system).await,
            ProviderClient::OpenAI(c) => c.generate(prompt, system).await,
            ProviderClient::Gemini(c) => c.generate(prompt, system).await,
        }
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>> {
        match self {
            ProviderClient::Ollama(c) => c.embeddings(input).await,
            ProviderClient::OpenAI(c) => c.embeddings(input).await,
            ProviderClient::Gemini(c) => c.embeddings(input).await,
        }
    }
}

#[derive(Debug)]
struct Slot {
    cfg: LlmModelConfig,
    client: ProviderClient,
}

impl Slot {
    fn new(cfg: LlmModelConfig) -> Result<Self> {
        let client = ProviderClient::new(&cfg)?;
        Ok(Self { cfg, client })
    }
}

/// Shared service owning the primary, secondary and embedding slots.
pub struct LlmServiceProfiles {
    primary: Slot,
    secondary: Option<Slot>,
    embedding: Slot,
    retry: RetryPolicy,
    health: HealthService,
}

impl LlmServiceProfiles {
    /// Builds all provider clients for `cfg`.
    ///
    /// # Errors
    /// Returns the first config or client construction error.
    pub fn new(cfg: LlmProfilesConfig) -> Result<Self> {
        cfg.validate()?;
        let svc = Self {
            primary: Slot::new(cfg.primary)?,
            secondary: cfg.secondary.map(Slot::new).transpose()?,
            embedding: Slot::new(cfg.embedding)?,
            retry: cfg.retry,
            health: HealthService::new(cfg.health_timeout_secs)?,
        };

        info!(
            target: "ai_llm_service::profiles",
            primary = %svc.primary.cfg.provider,
            primary_model = %svc.primary.cfg.model,
            secondary = %svc.secondary.as_ref().map(|s| s.cfg.provider.to_string()).unwrap_or_else(|| "none".into()),
            embedding_model = %svc.embedding.cfg.model,
            "LLM profiles initialized"
        );
        Ok(svc)
    }

    /// Shorthand for `new(profiles_from_env()?)`.
    pub fn from_env() -> Result<Self> {
        Self::new(profiles_from_env()?)
    }

    /// Whether `slot` has a model configured.
    pub fn has_slot(&self, slot: ProviderSlot) -> bool {
        self.slot(slot).is_some()
    }

    /// Config of a completion slot, if configured.
    pub fn slot_config(&self, slot: ProviderSlot) -> Option<&LlmModelConfig> {
        self.slot(slot).map(|s| &s.cfg)
    }

    /// Config of the embedding slot.
    pub fn embedding_config(&self) -> &LlmModelConfig {
        &self.embedding.cfg
    }

    /// Retry budget applied by [`Self::complete`] and [`Self::embed_query`].
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Budget for completions on `slot`: the secondary is a fallback and
    /// gets a single attempt under the same per-attempt timeout.
    pub fn completion_policy(&self, slot: ProviderSlot) -> RetryPolicy {
        match slot {
            ProviderSlot::Primary => self.retry.clone(),
            ProviderSlot::Secondary => RetryPolicy::once(self.retry.timeout),
        }
    }

    /// Single completion call against `slot`, without retries.
    ///
    /// # Errors
    /// [`AiLlmError::SlotNotConfigured`] for an empty secondary slot, otherwise
    /// the provider error.
    pub async fn generate(&self, slot: ProviderSlot, prompt: &str, system: Option<&str>) -> Result<String> {
        let s = self
            .slot(slot)
            .ok_or(AiLlmError::SlotNotConfigured(slot.as_str()))?;
        debug!(target: "ai_llm_service::profiles", %slot, model = %s.cfg.model, "generate");
        s.client.generate(prompt, system).await
    }

    /// Completion against `slot` under [`Self::completion_policy`].
    pub async fn complete(
        &self,
        slot: ProviderSlot,
        prompt: &str,
        system: Option<&str>,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, RetryError<AiLlmError>> {
        let policy = self.completion_policy(slot);
        with_retry("llm.complete", &policy, cancel, AiLlmError::is_retryable, || {
            self.generate(slot, prompt, system)
        })
        .await
    }

    /// Single embedding call, without retries.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>> {
        self.embedding.client.embed(input).await
    }

    /// Embedding with the configured retry budget.
    pub async fn embed_query(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<f32>, RetryError<AiLlmError>> {
        with_retry("llm.embed", &self.retry, cancel, AiLlmError::is_retryable, || {
            self.embed(input)
        })
        .await
    }

    /// Health snapshot for every distinct configured model.
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let mut list: Vec<&LlmModelConfig> = vec![&self.primary.cfg];
        if let Some(s) = &self.secondary {
            list.push(&s.cfg);
        }
        list.push(&self.embedding.cfg);
        list.dedup_by(|a, b| a == b);

        let mut out = Vec::with_capacity(list.len());
        for cfg in list {
            out.push(self.health.check(cfg).await);
        }
        out
    }

    fn slot(&self, slot: ProviderSlot) -> Option<&Slot> {
        match slot {
            ProviderSlot::Primary => Some(&self.primary),
            ProviderSlot::Secondary => self.secondary.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::services::http::test_support::cfg;

    fn profiles(uri: &str, secondary: bool) -> LlmServiceProfiles {
        LlmServiceProfiles::new(LlmProfilesConfig {
            primary: cfg(LlmProvider::OpenAI, uri, "gpt-4o"),
            secondary: secondary.then(|| cfg(LlmProvider::Ollama, uri, "qwen3:8b")),
            embedding: cfg(LlmProvider::Ollama, uri, "nomic-embed-text"),
            retry: RetryPolicy {
                attempts: 2,
                timeout: Duration::from_secs(2),
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            health_timeout_secs: Some(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn missing_secondary_slot_is_reported() {
        let svc = profiles("http://localhost:1", false);
        assert!(!svc.has_slot(ProviderSlot::Secondary));
        let err = svc.generate(ProviderSlot::Secondary, "x", None).await.unwrap_err();
        assert!(matches!(err, AiLlmError::SlotNotConfigured("secondary")));
    }

    #[tokio::test]
    async fn slots_route_to_their_own_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "from-openai"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "from-ollama"})))
            .mount(&server)
            .await;

        let svc = profiles(&server.uri(), true);
        let cancel = CancellationToken::new();
        assert_eq!(svc.complete(ProviderSlot::Primary, "q", None, &cancel).await.unwrap(), "from-openai");
        assert_eq!(svc.complete(ProviderSlot::Secondary, "q", None, &cancel).await.unwrap(), "from-ollama");
    }

    #[tokio::test]
    async fn complete_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let svc = profiles(&server.uri(), false);
        let err = svc
            .complete(ProviderSlot::Primary, "q", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn secondary_slot_is_tried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let svc = profiles(&server.uri(), true);
        assert_eq!(svc.completion_policy(ProviderSlot::Primary).attempts, 2);
        assert_eq!(svc.completion_policy(ProviderSlot::Secondary).attempts, 1);
        assert_eq!(svc.completion_policy(ProviderSlot::Secondary).timeout, Duration::from_secs(2));

        let err = svc
            .complete(ProviderSlot::Secondary, "q", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 1, .. }));
    }
}
