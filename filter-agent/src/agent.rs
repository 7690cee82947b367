//! Filter extraction with primary → secondary provider fallback.
//!
//! Flow per query:
//! 1. build the prompt from the vocabulary
//! 2. ask the primary slot (with its retry budget), parse and validate
//! 3. on provider error, timeout or contract violation ask the secondary slot once
//! 4. if both fail, report [`ExtractionError::Unavailable`] carrying a
//!    pass-through schema so callers can continue with pure vector search
//!
//! A confidence below [`AgentConfig::min_confidence`] keeps the semantic
//! remainder but clears every structured filter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use ai_llm_service::{AiLlmError, LlmServiceProfiles, ProviderSlot, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ExtractionError;
use crate::parse::{DroppedValue, ParsedExtraction, parse_completion};
use crate::prompt::{Prompt, build_prompt};
use crate::schema::FilterSchema;
use crate::vocabulary::AttributeVocabulary;

/// Completion backend with a primary and an optional secondary slot.
///
/// Both slots must honour the same output contract. Implemented for
/// [`LlmServiceProfiles`]; tests plug in scripted fakes.
pub trait CompletionSource: Send + Sync {
    fn has_secondary(&self) -> bool;

    fn complete<'a>(
        &'a self,
        slot: ProviderSlot,
        prompt: &'a Prompt,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, RetryError<AiLlmError>>> + Send + 'a>>;
}

impl CompletionSource for LlmServiceProfiles {
    fn has_secondary(&self) -> bool {
        self.has_slot(ProviderSlot::Secondary)
    }

    fn complete<'a>(
        &'a self,
        slot: ProviderSlot,
        prompt: &'a Prompt,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, RetryError<AiLlmError>>> + Send + 'a>> {
        Box::pin(async move {
            LlmServiceProfiles::complete(self, slot, &prompt.user, Some(&prompt.system), cancel).await
        })
    }
}

/// Agent tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Extractions below this confidence lose their structured filters.
    pub min_confidence: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
        }
    }
}

/// Successful extraction with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub schema: FilterSchema,
    /// Slot whose answer was used.
    pub slot: ProviderSlot,
    /// Values removed by vocabulary validation.
    pub dropped: Vec<DroppedValue>,
    /// Filters were cleared by the confidence gate.
    pub low_confidence: bool,
}

enum AttemptFailure {
    Cancelled,
    Failed(String),
}

/// Natural-language query → [`FilterSchema`].
pub struct FilterExtractionAgent {
    source: Arc<dyn CompletionSource>,
    vocab: Arc<AttributeVocabulary>,
    cfg: AgentConfig,
}

impl FilterExtractionAgent {
    pub fn new(
        source: Arc<dyn CompletionSource>,
        vocab: Arc<AttributeVocabulary>,
        cfg: AgentConfig,
    ) -> Self {
        Self { source, vocab, cfg }
    }

    pub fn vocabulary(&self) -> &AttributeVocabulary {
        &self.vocab
    }

    /// Extracts the schema only; see [`Self::extract_detailed`].
    pub async fn extract(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<FilterSchema, ExtractionError> {
        self.extract_detailed(query, cancel).await.map(|e| e.schema)
    }

    /// Extracts a schema for `query`, falling back to the secondary slot.
    ///
    /// # Errors
    /// - [`ExtractionError::EmptyQuery`] for blank input
    /// - [`ExtractionError::Cancelled`] when `cancel` fires
    /// - [`ExtractionError::Unavailable`] when no slot produced a valid answer
    pub async fn extract_detailed(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ExtractionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ExtractionError::EmptyQuery);
        }
        let started = Instant::now();
        let prompt = build_prompt(&self.vocab, query);

        let primary = match self.attempt(ProviderSlot::Primary, &prompt, query, cancel).await {
            Ok(parsed) => return Ok(self.finish(parsed, ProviderSlot::Primary, started)),
            Err(AttemptFailure::Cancelled) => return Err(ExtractionError::Cancelled),
            Err(AttemptFailure::Failed(reason)) => reason,
        };

        let secondary = if self.source.has_secondary() {
            warn!(
                target: "filter_agent::extract",
                error = %primary,
                "primary provider failed; falling back to secondary"
            );
            match self.attempt(ProviderSlot::Secondary, &prompt, query, cancel).await {
                Ok(parsed) => return Ok(self.finish(parsed, ProviderSlot::Secondary, started)),
                Err(AttemptFailure::Cancelled) => return Err(ExtractionError::Cancelled),
                Err(AttemptFailure::Failed(reason)) => Some(reason),
            }
        } else {
            None
        };

        warn!(
            target: "filter_agent::extract",
            primary = %primary,
            secondary = %secondary.as_deref().unwrap_or("not configured"),
            latency_ms = started.elapsed().as_millis() as u64,
            "extraction unavailable; degrading to pass-through schema"
        );
        Err(ExtractionError::Unavailable {
            degraded: Box::new(FilterSchema::passthrough(query)),
            primary,
            secondary,
        })
    }

    async fn attempt(
        &self,
        slot: ProviderSlot,
        prompt: &Prompt,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<ParsedExtraction, AttemptFailure> {
        let raw = match self.source.complete(slot, prompt, cancel).await {
            Ok(raw) => raw,
            Err(RetryError::Cancelled) => return Err(AttemptFailure::Cancelled),
            Err(e) => return Err(AttemptFailure::Failed(e.to_string())),
        };
        debug!(target: "filter_agent::extract", %slot, len = raw.len(), "completion received");
        parse_completion(&raw, &self.vocab, query).map_err(|e| AttemptFailure::Failed(e.to_string()))
    }

    fn finish(&self, parsed: ParsedExtraction, slot: ProviderSlot, started: Instant) -> Extraction {
        let ParsedExtraction { mut schema, dropped } = parsed;
        let low_confidence = schema.confidence < self.cfg.min_confidence && !schema.has_no_filters();
        if low_confidence {
            warn!(
                target: "filter_agent::extract",
                confidence = schema.confidence,
                min = self.cfg.min_confidence,
                "low confidence; dropping structured filters"
            );
            schema.clear_filters();
        }

        info!(
            target: "filter_agent::extract",
            %slot,
            filters = schema.filter_count(),
            dropped = dropped.len(),
            confidence = schema.confidence,
            latency_ms = started.elapsed().as_millis() as u64,
            "filters extracted"
        );

        Extraction {
            schema,
            slot,
            dropped,
            low_confidence,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use ai_llm_service::Attempt;

    use super::*;

    /// Scripted completion source: each slot pops its next reply.
    pub(crate) struct ScriptedSource {
        replies: Mutex<HashMap<ProviderSlot, Vec<Result<String, RetryError<AiLlmError>>>>>,
        secondary: bool,
        pub calls: Mutex<Vec<ProviderSlot>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(
            primary: Vec<Result<String, RetryError<AiLlmError>>>,
            secondary: Option<Vec<Result<String, RetryError<AiLlmError>>>>,
        ) -> Self {
            let mut replies = HashMap::new();
            replies.insert(ProviderSlot::Primary, primary);
            let has_secondary = secondary.is_some();
            replies.insert(ProviderSlot::Secondary, secondary.unwrap_or_default());
            Self {
                replies: Mutex::new(replies),
                secondary: has_secondary,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionSource for ScriptedSource {
        fn has_secondary(&self) -> bool {
            self.secondary
        }

        fn complete<'a>(
            &'a self,
            slot: ProviderSlot,
            _prompt: &'a Prompt,
            _cancel: &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<String, RetryError<AiLlmError>>> + Send + 'a>> {
            self.calls.lock().unwrap().push(slot);
            let next = self
                .replies
                .lock()
                .unwrap()
                .get_mut(&slot)
                .and_then(|v| (!v.is_empty()).then(|| v.remove(0)))
                .unwrap_or_else(|| Err(timeout()));
            Box::pin(async move { next })
        }
    }

    pub(crate) fn timeout() -> RetryError<AiLlmError> {
        RetryError::Exhausted {
            attempts: 2,
            last: Attempt::TimedOut(Duration::from_secs(30)),
        }
    }

    fn agent(source: ScriptedSource) -> (FilterExtractionAgent, Arc<ScriptedSource>) {
        let source = Arc::new(source);
        let agent = FilterExtractionAgent::new(
            source.clone(),
            Arc::new(AttributeVocabulary::french().unwrap()),
            AgentConfig::default(),
        );
        (agent, source)
    }

    const VASE_NOIR: &str =
        r#"{"semantic_query": "vase noir", "filters": {"color": "noir"}, "confidence": 0.9}"#;

    #[tokio::test]
    async fn primary_answer_is_used() {
        let (agent, source) = agent(ScriptedSource::new(vec![Ok(VASE_NOIR.into())], Some(vec![])));
        let out = agent.extract_detailed("vase noir", &CancellationToken::new()).await.unwrap();

        assert_eq!(out.slot, ProviderSlot::Primary);
        assert_eq!(out.schema.color.as_deref(), Some("noir"));
        assert_eq!(*source.calls.lock().unwrap(), vec![ProviderSlot::Primary]);
    }

    #[tokio::test]
    async fn parse_failure_falls_back_to_secondary() {
        let (agent, source) = agent(ScriptedSource::new(
            vec![Ok("Sure! Here are your filters".into())],
            Some(vec![Ok(VASE_NOIR.into())]),
        ));
        let out = agent.extract_detailed("vase noir", &CancellationToken::new()).await.unwrap();

        assert_eq!(out.slot, ProviderSlot::Secondary);
        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![ProviderSlot::Primary, ProviderSlot::Secondary]
        );
    }

    #[tokio::test]
    async fn both_failing_yields_unavailable_with_passthrough() {
        let (agent, _) = agent(ScriptedSource::new(vec![Err(timeout())], Some(vec![Err(timeout())])));
        let err = agent.extract("  vase noir ", &CancellationToken::new()).await.unwrap_err();

        assert!(err.is_retryable());
        let degraded = err.degraded_schema().unwrap();
        assert_eq!(degraded.semantic_query, "vase noir");
        assert!(degraded.has_no_filters());
    }

    #[tokio::test]
    async fn no_secondary_configured_reports_it() {
        let (agent, source) = agent(ScriptedSource::new(vec![Err(timeout())], None));
        let err = agent.extract("lampe", &CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("not configured"));
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_filters_is_a_valid_schema_not_an_error() {
        let reply = r#"{"semantic_query": "idée cadeau", "filters": {}, "confidence": 0.6}"#;
        let (agent, _) = agent(ScriptedSource::new(vec![Ok(reply.into())], None));
        let schema = agent.extract("une idée cadeau", &CancellationToken::new()).await.unwrap();
        assert!(schema.has_no_filters());
    }

    #[tokio::test]
    async fn low_confidence_clears_filters() {
        let reply = r#"{"semantic_query": "truc", "filters": {"color": "bleu"}, "confidence": 0.1}"#;
        let (agent, _) = agent(ScriptedSource::new(vec![Ok(reply.into())], None));
        let out = agent.extract_detailed("truc bleu?", &CancellationToken::new()).await.unwrap();

        assert!(out.low_confidence);
        assert!(out.schema.has_no_filters());
        assert_eq!(out.schema.semantic_query, "truc");
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let (agent, source) = agent(ScriptedSource::new(vec![], None));
        let err = agent.extract("   ", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyQuery));
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_is_not_degraded() {
        let (agent, _) = agent(ScriptedSource::new(vec![Err(RetryError::Cancelled)], Some(vec![])));
        let err = agent.extract("vase", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Cancelled));
    }
}
