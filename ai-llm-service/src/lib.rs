//! Shared LLM access layer.
//!
//! Wraps the chat and embedding endpoints of Gemini, OpenAI and Ollama behind
//! one [`service_profiles::LlmServiceProfiles`] value with three slots:
//! a **primary** completion model, an optional **secondary** fallback with the
//! same output contract, and an **embedding** model.
//!
//! Retries, per-attempt timeouts and cooperative cancellation live in
//! [`retry`], health probes in [`health_service`], and the tracing layer used
//! by binaries in [`telemetry`].

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod retry;
pub mod service_profiles;
pub mod services;
pub mod telemetry;

pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use config::profiles_config::LlmProfilesConfig;
pub use error_handler::{AiLlmError, Result};
pub use retry::{Attempt, RetryError, RetryPolicy, with_retry};
pub use service_profiles::{LlmServiceProfiles, ProviderSlot};
