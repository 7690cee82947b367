//! Pipeline configuration.
//!
//! Everything is an explicit value passed at construction time, so several
//! pipelines (different collections, vocabularies or models) can coexist in
//! one process.

use ai_llm_service::LlmProfilesConfig;
use ai_llm_service::config::default_config::profiles_from_env;
use ai_llm_service::error_handler::{env_opt, env_opt_f32, env_opt_u32, validate_range_f32};
use filter_agent::{AgentConfig, AttributeVocabulary};
use product_store::StoreConfig;

use crate::errors::{PipelineError, Result};

/// Query executor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Result count when the caller does not ask for one.
    pub default_limit: usize,
    /// Hard cap on the result count.
    pub max_limit: usize,
    /// Hits scoring below this are discarded.
    pub min_score: Option<f32>,
    /// Fetch `limit × oversample` hits to survive client-side filtering.
    pub oversample: usize,
    /// Floor for the HNSW candidate list size.
    pub min_candidates: u64,
    /// Extra fetch factor when the store rejects the server-side filter.
    pub fallback_factor: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            min_score: None,
            oversample: 4,
            min_candidates: 150,
            fallback_factor: 3,
        }
    }
}

impl ExecutorConfig {
    /// Reads `SEARCH_DEFAULT_LIMIT`, `SEARCH_MAX_LIMIT` and `SEARCH_MIN_SCORE`
    /// (default 0.5).
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            min_score: Some(0.5),
            ..Self::default()
        };
        if let Some(n) = env_opt_u32("SEARCH_DEFAULT_LIMIT").map_err(config_err)? {
            cfg.default_limit = n as usize;
        }
        if let Some(n) = env_opt_u32("SEARCH_MAX_LIMIT").map_err(config_err)? {
            cfg.max_limit = n as usize;
        }
        if let Some(s) = env_opt_f32("SEARCH_MIN_SCORE").map_err(config_err)? {
            cfg.min_score = Some(s);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 || self.max_limit == 0 {
            return Err(PipelineError::Config("limits must be > 0".into()));
        }
        if self.default_limit > self.max_limit {
            return Err(PipelineError::Config(
                "SEARCH_DEFAULT_LIMIT exceeds SEARCH_MAX_LIMIT".into(),
            ));
        }
        if self.oversample == 0 || self.fallback_factor == 0 {
            return Err(PipelineError::Config("fetch factors must be > 0".into()));
        }
        if let Some(s) = self.min_score {
            validate_range_f32("min_score", s, -1.0, 1.0).map_err(config_err)?;
        }
        Ok(())
    }

    /// Caller-requested limit, defaulted and capped; never 0.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

/// Everything [`crate::SearchPipeline::connect`] needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub llm: LlmProfilesConfig,
    pub store: StoreConfig,
    pub executor: ExecutorConfig,
    pub agent: AgentConfig,
    pub vocabulary: AttributeVocabulary,
}

impl PipelineConfig {
    /// Assembles the configuration from the process environment.
    ///
    /// `SEARCH_VOCABULARY` selects a preset (`english`, `french`) or a YAML
    /// file; default `english`.
    pub fn from_env() -> Result<Self> {
        let vocab_name = env_opt("SEARCH_VOCABULARY").unwrap_or_else(|| "english".to_string());
        let vocabulary = AttributeVocabulary::load(&vocab_name)
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        Ok(Self {
            llm: profiles_from_env().map_err(config_err)?,
            store: StoreConfig::from_env().map_err(|e| PipelineError::Config(e.to_string()))?,
            executor: ExecutorConfig::from_env()?,
            agent: AgentConfig::default(),
            vocabulary,
        })
    }
}

fn config_err(e: ai_llm_service::AiLlmError) -> PipelineError {
    PipelineError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_defaulted_and_capped() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.effective_limit(None), 10);
        assert_eq!(cfg.effective_limit(Some(3)), 3);
        assert_eq!(cfg.effective_limit(Some(10_000)), 100);
        assert_eq!(cfg.effective_limit(Some(0)), 1);
    }

    #[test]
    fn validate_rejects_inconsistent_limits() {
        let cfg = ExecutorConfig {
            default_limit: 50,
            max_limit: 20,
            ..ExecutorConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ExecutorConfig {
            min_score: Some(3.0),
            ..ExecutorConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(ExecutorConfig::default().validate().is_ok());
    }
}
