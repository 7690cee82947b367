//! Ollama client for text generation and embeddings.
//!
//! - `POST {endpoint}/api/generate`   non-streaming generation (`stream=false`)
//! - `POST {endpoint}/api/embeddings` single-text embedding (`prompt` field)

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::AiLlmError;
use crate::services::http::{build_client, checked_base, post_json};

/// Thin client for a local Ollama runtime.
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
    url_embeddings: String,
}

impl OllamaService {
    /// Creates a client for `cfg`.
    ///
    /// # Errors
    /// Fails for a non-Ollama config, a non-HTTP endpoint, or if the HTTP
    /// client cannot be built.
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        let base = checked_base(&cfg, LlmProvider::Ollama)?;
        let client = build_client(&cfg, HeaderMap::new())?;
        Ok(Self {
            client,
            url_generate: format!("{base}/api/generate"),
            url_embeddings: format!("{base}/api/embeddings"),
            cfg,
        })
    }

    /// Generates a completion; `system` maps to Ollama's `system` field.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, AiLlmError> {
        let body = GenerateRequest {
            model: &self.cfg.model,
            prompt,
            system,
            stream: false,
            format: self.cfg.json_mode.then_some("json"),
            options: GenerateOptions {
                temperature: self.cfg.temperature,
                top_p: self.cfg.top_p,
                num_predict: self.cfg.max_tokens,
            },
        };
        let out: GenerateResponse = post_json(
            &self.client,
            &self.cfg,
            &self.url_generate,
            &body,
            "`{ response: string }` with stream=false",
        )
        .await?;
        Ok(out.response)
    }

    /// Embeds one text with the configured model.
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            prompt: input,
        };
        let out: EmbeddingsResponse = post_json(
            &self.client,
            &self.cfg,
            &self.url_embeddings,
            &body,
            "`{ embedding: number[] }`",
        )
        .await?;
        Ok(out.embedding)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: GenerateOptions,
}

#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}
