//! HTTP plumbing shared by the provider clients.

use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::config::llm_model_config::LlmModelConfig;
use crate::error_handler::{
    AiLlmError, HttpError, ProviderError, ProviderErrorKind, make_snippet,
};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Validates provider/endpoint of `cfg` and returns its trimmed base URL.
pub(crate) fn checked_base(cfg: &LlmModelConfig, expected: crate::LlmProvider) -> Result<String, AiLlmError> {
    if cfg.provider != expected {
        return Err(ProviderError::new(expected, ProviderErrorKind::InvalidProvider).into());
    }
    let base = cfg.base_url();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ProviderError::new(
            expected,
            ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
        )
        .into());
    }
    Ok(base.to_string())
}

/// Builds a client with compression, the configured timeout and default headers.
pub(crate) fn build_client(cfg: &LlmModelConfig, headers: HeaderMap) -> Result<reqwest::Client, AiLlmError> {
    let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .default_headers(headers)
        .build()?)
}

/// POSTs `body` as JSON and decodes a 2xx response into `R`.
///
/// Non-2xx responses become [`ProviderErrorKind::HttpStatus`] with a body
/// snippet; undecodable bodies become [`ProviderErrorKind::Decode`] carrying
/// `expect` as a hint about the awaited shape.
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    cfg: &LlmModelConfig,
    url: &str,
    body: &B,
    expect: &'static str,
) -> Result<R, AiLlmError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let started = Instant::now();
    debug!(
        target: "ai_llm_service::http",
        provider = %cfg.provider,
        model = %cfg.model,
        "POST {url}"
    );

    let resp = client.post(url).json(body).send().await?;
    let status = resp.status();

    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let snippet = make_snippet(&text);
        error!(
            target: "ai_llm_service::http",
            provider = %cfg.provider,
            model = %cfg.model,
            %status,
            %url,
            %snippet,
            latency_ms = started.elapsed().as_millis() as u64,
            "provider returned non-success status"
        );
        return Err(ProviderError::new(
            cfg.provider,
            ProviderErrorKind::HttpStatus(HttpError {
                status,
                url: url.to_string(),
                snippet,
            }),
        )
        .into());
    }

    let out = resp.json::<R>().await.map_err(|e| {
        error!(
            target: "ai_llm_service::http",
            provider = %cfg.provider,
            model = %cfg.model,
            error = %e,
            "failed to decode provider response"
        );
        ProviderError::new(
            cfg.provider,
            ProviderErrorKind::Decode(format!("serde error: {e}; expected {expect}")),
        )
    })?;

    debug!(
        target: "ai_llm_service::http",
        provider = %cfg.provider,
        model = %cfg.model,
        latency_ms = started.elapsed().as_millis() as u64,
        "provider call completed"
    );
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{LlmModelConfig, LlmProvider};

    pub fn cfg(provider: LlmProvider, endpoint: &str, model: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider,
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: Some("test-key".into()),
            max_tokens: Some(256),
            temperature: Some(0.1),
            top_p: None,
            timeout_secs: Some(5),
            json_mode: true,
        }
    }
}
