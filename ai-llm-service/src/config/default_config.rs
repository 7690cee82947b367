//! LLM slot configs loaded from environment variables.
//!
//! Provider selection:
//! - `PRIMARY_LLM`        = `gemini` | `openai` | `ollama` (default `gemini`)
//! - `SECONDARY_LLM`      = optional fallback provider (unset/`none` disables it)
//! - `EMBEDDING_PROVIDER` = provider for query embeddings (default = `PRIMARY_LLM`)
//!
//! Common:
//! - `LLM_MAX_TOKENS`     = optional max tokens (u32)
//! - `LLM_TIMEOUT_SECS`   = per-attempt timeout (default 30)
//! - `LLM_RETRY_ATTEMPTS` = attempts per provider (default 2)
//!
//! Gemini: `GEMINI_API_KEY` (required when used), `GEMINI_URL`,
//! `GEMINI_MODEL` (default `gemini-2.5-flash`), `GEMINI_EMBEDDING_MODEL`
//! (default `text-embedding-004`).
//!
//! OpenAI: `OPENAI_API_KEY` (required when used), `OPENAI_URL`,
//! `OPENAI_MODEL` (default `gpt-4o`), `OPENAI_EMBEDDING_MODEL`
//! (default `text-embedding-3-small`).
//!
//! Ollama: `OLLAMA_URL` or `OLLAMA_PORT`, `OLLAMA_MODEL` (required when used),
//! `EMBEDDING_MODEL` (required when used for embeddings).

use crate::{
    config::{
        llm_model_config::LlmModelConfig, llm_provider::LlmProvider,
        profiles_config::LlmProfilesConfig,
    },
    error_handler::{AiLlmError, ConfigError, Result, env_opt, env_opt_u32, env_opt_u64, must_env},
    retry::RetryPolicy,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Resolves the Ollama endpoint.
///
/// Precedence: `OLLAMA_URL`, then `OLLAMA_PORT` → `http://localhost:{port}`,
/// then the provider default.
fn ollama_endpoint() -> Result<String> {
    if let Some(url) = env_opt("OLLAMA_URL") {
        return Ok(url);
    }
    if let Some(port) = env_opt("OLLAMA_PORT") {
        port.parse::<u16>().map_err(|_| ConfigError::InvalidNumber {
            var: "OLLAMA_PORT",
            reason: "expected u16 (1..=65535)",
        })?;
        return Ok(format!("http://localhost:{port}"));
    }
    Ok(LlmProvider::Ollama.default_endpoint().to_string())
}

fn endpoint_for(provider: LlmProvider) -> Result<String> {
    match provider {
        LlmProvider::Ollama => ollama_endpoint(),
        LlmProvider::OpenAI => Ok(env_opt("OPENAI_URL").unwrap_or_else(|| provider.default_endpoint().into())),
        LlmProvider::Gemini => Ok(env_opt("GEMINI_URL").unwrap_or_else(|| provider.default_endpoint().into())),
    }
}

fn api_key_for(provider: LlmProvider) -> Result<Option<String>> {
    match provider {
        LlmProvider::Ollama => Ok(None),
        LlmProvider::OpenAI => must_env("OPENAI_API_KEY").map(Some),
        LlmProvider::Gemini => must_env("GEMINI_API_KEY").map(Some),
    }
}

fn timeout_secs() -> Result<u64> {
    Ok(env_opt_u64("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS))
}

/// Reads a provider name from `var`, falling back to `default` when unset.
pub fn provider_from_env(var: &'static str, default: LlmProvider) -> Result<LlmProvider> {
    match env_opt(var) {
        Some(v) => v.parse::<LlmProvider>().map_err(AiLlmError::from),
        None => Ok(default),
    }
}

/// Completion config for `provider`: low temperature, JSON output.
pub fn chat_config_for(provider: LlmProvider) -> Result<LlmModelConfig> {
    let model = match provider {
        LlmProvider::Gemini => env_opt("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".into()),
        LlmProvider::OpenAI => env_opt("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".into()),
        LlmProvider::Ollama => must_env("OLLAMA_MODEL")?,
    };

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint: endpoint_for(provider)?,
        api_key: api_key_for(provider)?,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(0.1),
        top_p: None,
        timeout_secs: Some(timeout_secs()?),
        json_mode: true,
    })
}

/// Embedding config for `provider`.
pub fn embedding_config_for(provider: LlmProvider) -> Result<LlmModelConfig> {
    let model = match provider {
        LlmProvider::Gemini => {
            env_opt("GEMINI_EMBEDDING_MODEL").unwrap_or_else(|| "text-embedding-004".into())
        }
        LlmProvider::OpenAI => {
            env_opt("OPENAI_EMBEDDING_MODEL").unwrap_or_else(|| "text-embedding-3-small".into())
        }
        LlmProvider::Ollama => must_env("EMBEDDING_MODEL")?,
    };

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint: endpoint_for(provider)?,
        api_key: api_key_for(provider)?,
        max_tokens: None,
        temperature: None,
        top_p: None,
        timeout_secs: Some(timeout_secs()?),
        json_mode: false,
    })
}

/// Builds the full slot set from the environment.
///
/// `SECONDARY_LLM=none` (or unset) leaves the fallback slot empty. A
/// secondary equal to the primary provider is allowed and still counts as a
/// second attempt.
pub fn profiles_from_env() -> Result<LlmProfilesConfig> {
    let primary_provider = provider_from_env("PRIMARY_LLM", LlmProvider::Gemini)?;
    let primary = chat_config_for(primary_provider)?;

    let secondary = match env_opt("SECONDARY_LLM") {
        Some(v) if v.eq_ignore_ascii_case("none") => None,
        Some(v) => Some(chat_config_for(v.parse::<LlmProvider>()?)?),
        None => None,
    };

    let embedding_provider = provider_from_env("EMBEDDING_PROVIDER", primary_provider)?;
    let embedding = embedding_config_for(embedding_provider)?;

    let retry = RetryPolicy::from_env("LLM_RETRY_ATTEMPTS", "LLM_TIMEOUT_SECS")?;

    let cfg = LlmProfilesConfig {
        primary,
        secondary,
        embedding,
        retry,
        health_timeout_secs: Some(10),
    };
    cfg.validate()?;
    Ok(cfg)
}
