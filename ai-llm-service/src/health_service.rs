//! Health probes for LLM backends.
//!
//! - Ollama: `GET {endpoint}/api/tags`, model must be listed
//! - OpenAI: `GET {endpoint}/v1/models` with bearer auth, model must be listed
//! - Gemini: `GET {endpoint}/v1beta/models/{model}` with `x-goog-api-key`
//!
//! [`HealthService::check`] never fails; errors become `ok = false`.

use std::time::{Duration, Instant};

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{AiLlmError, HealthError, HttpError, make_snippet};

/// Serializable health snapshot for one configured model.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub provider: String,
    pub endpoint: String,
    pub model: Option<String>,
    pub ok: bool,
    pub latency_ms: u128,
    pub message: String,
}

impl HealthStatus {
    fn new(cfg: &LlmModelConfig, ok: bool, latency_ms: u128, message: impl Into<String>) -> Self {
        Self {
            provider: cfg.provider.to_string(),
            endpoint: cfg.base_url().to_string(),
            model: Some(cfg.model.clone()),
            ok,
            latency_ms,
            message: message.into(),
        }
    }
}

/// Health checker reusing one HTTP client for all probes.
pub struct HealthService {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HealthService {
    /// # Errors
    /// Returns [`AiLlmError::HttpTransport`] if the HTTP client cannot be built.
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, AiLlmError> {
        let default_timeout = Duration::from_secs(timeout_secs.unwrap_or(10));
        let client = reqwest::Client::builder().timeout(default_timeout).build()?;
        Ok(Self {
            client,
            default_timeout,
        })
    }

    /// Probes `cfg`'s provider and folds any failure into the returned status.
    pub async fn check(&self, cfg: &LlmModelConfig) -> HealthStatus {
        let start = Instant::now();
        let status = match self.probe(cfg).await {
            Ok((ok, message)) => HealthStatus::new(cfg, ok, start.elapsed().as_millis(), message),
            Err(err) => HealthStatus::new(cfg, false, start.elapsed().as_millis(), err.to_string()),
        };

        if status.ok {
            info!(
                target: "ai_llm_service::health",
                provider = %status.provider,
                model = %cfg.model,
                latency_ms = status.latency_ms as u64,
                "health probe ok"
            );
        } else {
            warn!(
                target: "ai_llm_service::health",
                provider = %status.provider,
                model = %cfg.model,
                latency_ms = status.latency_ms as u64,
                message = %status.message,
                "health probe failed"
            );
        }
        status
    }

    /// Strict probe: `Ok((model_available, message))` when the server answered 2xx.
    async fn probe(&self, cfg: &LlmModelConfig) -> Result<(bool, String), AiLlmError> {
        let base = cfg.base_url();
        let model = cfg.model.trim_start_matches("models/");
        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let (url, req) = match cfg.provider {
            LlmProvider::Ollama => {
                let url = format!("{base}/api/tags");
                let req = self.client.get(&url);
                (url, req)
            }
            LlmProvider::OpenAI => {
                let url = format!("{base}/v1/models");
                let key = cfg.api_key.as_deref().unwrap_or_default();
                let auth = header::HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| HealthError::InvalidRequest(e.to_string()))?;
                let req = self.client.get(&url).header(header::AUTHORIZATION, auth);
                (url, req)
            }
            LlmProvider::Gemini => {
                let url = format!("{base}/v1beta/models/{model}");
                let key = header::HeaderValue::from_str(cfg.api_key.as_deref().unwrap_or_default())
                    .map_err(|e| HealthError::InvalidRequest(e.to_string()))?;
                let req = self.client.get(&url).header("x-goog-api-key", key);
                (url, req)
            }
        };

        let resp = req.timeout(timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let snippet = make_snippet(&resp.text().await.unwrap_or_default());
            return Err(HealthError::HttpStatus(HttpError { status, url, snippet }).into());
        }

        let listed = match cfg.provider {
            LlmProvider::Ollama => resp
                .json::<OllamaTags>()
                .await
                .ok()
                .map(|t| t.models.iter().any(|m| m.name == model)),
            LlmProvider::OpenAI => resp
                .json::<OpenAiModels>()
                .await
                .ok()
                .map(|m| m.data.iter().any(|m| m.id == model)),
            // A 2xx on the model resource is already proof of existence.
            LlmProvider::Gemini => Some(true),
        };

        Ok(match listed {
            Some(true) => (true, format!("{} is healthy; model is available", cfg.provider)),
            Some(false) => (false, format!("{} is up, but model `{model}` is not listed", cfg.provider)),
            None => (true, format!("{} is reachable; model list could not be decoded", cfg.provider)),
        })
    }
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Deserialize)]
struct OllamaTag {
    name: String,
}

#[derive(Deserialize)]
struct OpenAiModels {
    data: Vec<OpenAiModel>,
}

#[derive(Deserialize)]
struct OpenAiModel {
    id: String,
}
