//! Gemini (Generative Language API) client for generation and embeddings.
//!
//! - `POST {endpoint}/v1beta/models/{model}:generateContent`
//! - `POST {endpoint}/v1beta/models/{model}:embedContent` with `taskType = RETRIEVAL_QUERY`
//!
//! The key travels in the `x-goog-api-key` header, never in the URL, so it
//! does not leak into logs of request URLs.

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{AiLlmError, ProviderError, ProviderErrorKind};
use crate::services::http::{build_client, checked_base, post_json};

/// Embedding task type for search queries (documents were embedded as
/// `RETRIEVAL_DOCUMENT` at import time).
const QUERY_TASK_TYPE: &str = "RETRIEVAL_QUERY";

#[derive(Debug)]
pub struct GeminiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
    url_embed: String,
}

impl GeminiService {
    /// Creates a client for `cfg`.
    ///
    /// # Errors
    /// Fails for a non-Gemini config, a missing key, an invalid endpoint or
    /// header value, or if the HTTP client cannot be built.
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        let base = checked_base(&cfg, LlmProvider::Gemini)?;
        let api_key = cfg
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::new(LlmProvider::Gemini, ProviderErrorKind::MissingApiKey))?;

        let mut headers = header::HeaderMap::new();
        let mut key = header::HeaderValue::from_str(api_key).map_err(|e| {
            ProviderError::new(
                LlmProvider::Gemini,
                ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
            )
        })?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);

        let client = build_client(&cfg, headers)?;
        let model = cfg.model.trim_start_matches("models/");
        let url_generate = format!("{base}/v1beta/models/{model}:generateContent");
        let url_embed = format!("{base}/v1beta/models/{model}:embedContent");

        info!(target: "ai_llm_service::gemini", model = %cfg.model, "GeminiService initialized");

        Ok(Self {
            client,
            cfg,
            url_generate,
            url_embed,
        })
    }

    /// Runs one `generateContent` call and joins the text parts of the first candidate.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, AiLlmError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system.map(|s| Content {
                role: None,
                parts: vec![Part { text: s }],
            }),
            generation_config: GenerationConfig {
                temperature: self.cfg.temperature,
                top_p: self.cfg.top_p,
                max_output_tokens: self.cfg.max_tokens,
                response_mime_type: self.cfg.json_mode.then_some("application/json"),
            },
        };

        let out: GenerateContentResponse = post_json(
            &self.client,
            &self.cfg,
            &self.url_generate,
            &body,
            "`candidates[0].content.parts[].text`",
        )
        .await?;

        let text: String = out
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::new(LlmProvider::Gemini, ProviderErrorKind::EmptyChoices).into());
        }
        Ok(text)
    }

    /// Embeds one search query.
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let model = format!("models/{}", self.cfg.model.trim_start_matches("models/"));
        let body = EmbedContentRequest {
            model: &model,
            content: Content {
                role: None,
                parts: vec![Part { text: input }],
            },
            task_type: QUERY_TASK_TYPE,
        };
        let out: EmbedContentResponse = post_json(
            &self.client,
            &self.cfg,
            &self.url_embed,
            &body,
            "`embedding.values`",
        )
        .await?;
        Ok(out.embedding.values)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartOut>,
}

#[derive(Debug, Deserialize)]
struct PartOut {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::services::http::test_support::cfg;

    #[tokio::test]
    async fn generate_joins_parts_and_sends_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "sys"}]},
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]
            })))
            .mount(&server)
            .await;

        let svc = GeminiService::new(cfg(LlmProvider::Gemini, &server.uri(), "gemini-2.5-flash")).unwrap();
        assert_eq!(svc.generate("q", Some("sys")).await.unwrap(), "{\"a\":1}");
    }

    #[tokio::test]
    async fn blocked_prompt_without_candidates_is_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"promptFeedback": {"blockReason": "SAFETY"}})))
            .mount(&server)
            .await;

        let svc = GeminiService::new(cfg(LlmProvider::Gemini, &server.uri(), "gemini-2.5-flash")).unwrap();
        let err = svc.generate("q", None).await.unwrap_err();
        assert!(err.to_string().contains("no completion text"));
    }

    #[tokio::test]
    async fn embeddings_request_retrieval_query_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/text-embedding-004:embedContent"))
            .and(body_partial_json(json!({
                "model": "models/text-embedding-004",
                "taskType": "RETRIEVAL_QUERY"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": {"values": [0.5, 0.5]}})))
            .mount(&server)
            .await;

        let svc = GeminiService::new(cfg(LlmProvider::Gemini, &server.uri(), "text-embedding-004")).unwrap();
        assert_eq!(svc.embeddings("vase").await.unwrap(), vec![0.5, 0.5]);
    }
}
