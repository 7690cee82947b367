//! Bounded retries with per-attempt timeout, exponential backoff and cancellation.
//!
//! Every outbound call of the search pipeline (LLM completion, embedding,
//! vector search) goes through [`with_retry`], so no call can hang past
//! `attempts × timeout` plus backoff, and a cancelled token aborts the
//! in-flight attempt and any pending backoff sleep immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error_handler::{Result, env_opt_u32, env_opt_u64};

/// Retry budget for one logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 are treated as 1.
    pub attempts: u32,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Delay before the second attempt; doubled for each further attempt.
    pub base_backoff: Duration,
    /// Cap on the delay between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            timeout: Duration::from_secs(30),
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn once(timeout: Duration) -> Self {
        Self {
            attempts: 1,
            timeout,
            ..Self::default()
        }
    }

    /// Reads attempts and timeout from the given variables, defaulting the rest.
    ///
    /// # Errors
    /// Returns a config error when a variable is set but not a number.
    pub fn from_env(attempts_var: &'static str, timeout_secs_var: &'static str) -> Result<Self> {
        let mut policy = Self::default();
        if let Some(n) = env_opt_u32(attempts_var)? {
            policy.attempts = n.max(1);
        }
        if let Some(secs) = env_opt_u64(timeout_secs_var)? {
            policy.timeout = Duration::from_secs(secs.max(1));
        }
        Ok(policy)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Outcome of the last attempt before giving up.
#[derive(Debug, Error)]
pub enum Attempt<E> {
    #[error("{0}")]
    Failed(E),
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// Why [`with_retry`] returned without a value.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The caller's token was cancelled; partial work was dropped.
    #[error("cancelled")]
    Cancelled,
    /// The budget ran out, or the last error was not retryable.
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: Attempt<E> },
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

/// Runs `call` until it succeeds, the error is not retryable, the budget is
/// spent, or `cancel` fires.
///
/// Timeouts of a single attempt are always considered retryable.
pub async fn with_retry<T, E, F, Fut, R>(
    op: &'static str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    retryable: R,
    mut call: F,
) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            r = tokio::time::timeout(policy.timeout, call()) => r,
        };

        let last = match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(target: "ai_llm_service::retry", op, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => {
                if !retryable(&e) {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: Attempt::Failed(e),
                    });
                }
                Attempt::Failed(e)
            }
            Err(_) => Attempt::TimedOut(policy.timeout),
        };

        if attempt >= attempts {
            warn!(target: "ai_llm_service::retry", op, attempts = attempt, error = %last, "retry budget exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last,
            });
        }

        let delay = policy.backoff(attempt);
        warn!(
            target: "ai_llm_service::retry",
            op,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %last,
            "attempt failed; backing off"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
