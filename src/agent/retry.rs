//! Bounded retry around a single query execution.
//!
//! ```text
//! Attempting ──ok──────────────────────────▶ Succeeded
//!     │
//!     └─err─▶ retryable and retries left? ──yes──▶ (delay) Attempting
//!                              │
//!                              no
//!                              ▼
//!                          Exhausted
//! ```
//!
//! Exhaustion is not an error: the last failure is handed back so the
//! conversation can show it to the model. Only cancellation escapes.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::delay::pause;
use super::executor::QueryExecutor;
use crate::error::{AgentError, ExecutionError};

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts allowed after the first failure.
    pub retry_limit: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Upper bound on executions for one query.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }
}

/// Terminal state of one retried query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The query produced a result.
    Succeeded {
        /// Flattened result text.
        text: String,
        /// Executions performed, including the successful one.
        attempts: u32,
    },
    /// Every permitted attempt failed, or the failure was not retryable.
    Exhausted {
        /// The most recent failure.
        last_error: ExecutionError,
        /// Executions performed.
        attempts: u32,
    },
}

impl RetryOutcome {
    /// Text to feed back into the conversation.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Succeeded { text, .. } => text.clone(),
            Self::Exhausted {
                last_error,
                attempts,
            } => format!("Query failed after {attempts} attempt(s): {last_error}"),
        }
    }

    /// Whether the query exhausted its attempts.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Per-invocation attempt bookkeeping.
#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    last_failure: Option<ExecutionError>,
}

/// Wraps a [`QueryExecutor`] with a [`RetryPolicy`].
pub struct RetryController<'a> {
    executor: &'a dyn QueryExecutor,
    policy: RetryPolicy,
}

impl<'a> RetryController<'a> {
    /// Creates a controller over `executor`.
    #[must_use]
    pub const fn new(executor: &'a dyn QueryExecutor, policy: RetryPolicy) -> Self {
        Self { executor, policy }
    }

    /// Runs `query` until it succeeds or the policy is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if `cancel` fires during an
    /// attempt or during the pause between attempts.
    pub async fn run(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<RetryOutcome, AgentError> {
        let mut state = RetryState::default();

        loop {
            state.attempts += 1;
            let error = match self.executor.execute(query, cancel).await {
                Ok(text) => {
                    return Ok(RetryOutcome::Succeeded {
                        text,
                        attempts: state.attempts,
                    });
                }
                Err(ExecutionError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => e,
            };

            let can_retry = error.is_retryable() && state.attempts < self.policy.max_attempts();
            warn!(
                attempt = state.attempts,
                max_attempts = self.policy.max_attempts(),
                will_retry = can_retry,
                error = %error,
                "query attempt failed"
            );
            state.last_failure = Some(error);

            if !can_retry {
                break;
            }
            pause(self.policy.delay, cancel).await?;
        }

        let last_error = state.last_failure.unwrap_or(ExecutionError::Store {
            message: "query failed".to_string(),
        });
        Ok(RetryOutcome::Exhausted {
            last_error,
            attempts: state.attempts,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    /// Fails the first `failures` calls with `error`, then succeeds.
    struct FlakyExecutor {
        calls: AtomicU32,
        failures: u32,
        error: ExecutionError,
    }

    impl FlakyExecutor {
        fn new(failures: u32, error: ExecutionError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                error,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryExecutor for FlakyExecutor {
        async fn execute(
            &self,
            _query: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, ExecutionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok("Alice Bob".to_string())
            }
        }
    }

    const fn policy(retry_limit: u32) -> RetryPolicy {
        RetryPolicy {
            retry_limit,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let executor = FlakyExecutor::new(0, ExecutionError::store("x"));
        let outcome = RetryController::new(&executor, policy(3))
            .run("SELECT 1", &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert_eq!(
            outcome,
            RetryOutcome::Succeeded {
                text: "Alice Bob".to_string(),
                attempts: 1
            }
        );
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_recovers_within_limit() {
        let executor = FlakyExecutor::new(2, ExecutionError::store("database is locked"));
        let outcome = RetryController::new(&executor, policy(3))
            .run("SELECT 1", &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert!(matches!(outcome, RetryOutcome::Succeeded { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_exhaustion_never_exceeds_limit_plus_one() {
        for retry_limit in 0..5 {
            let executor = FlakyExecutor::new(u32::MAX, ExecutionError::store("disk I/O error"));
            let outcome = RetryController::new(&executor, policy(retry_limit))
                .run("SELECT 1", &CancellationToken::new())
                .await
                .unwrap_or_else(|e| panic!("run failed: {e}"));
            assert!(outcome.is_exhausted());
            assert_eq!(executor.calls(), retry_limit + 1);
        }
    }

    #[tokio::test]
    async fn test_exhausted_message_carries_last_error() {
        let executor = FlakyExecutor::new(u32::MAX, ExecutionError::store("no such table: Staff"));
        let outcome = RetryController::new(&executor, policy(3))
            .run("SELECT * FROM Staff", &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert_eq!(
            outcome.message(),
            "Query failed after 4 attempt(s): no such table: Staff"
        );
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let executor = FlakyExecutor::new(
            u32::MAX,
            ExecutionError::Rejected {
                reason: "DROP is forbidden".to_string(),
            },
        );
        let outcome = RetryController::new(&executor, policy(3))
            .run("DROP TABLE x", &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 1, .. }));
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_retry_delay() {
        let executor = FlakyExecutor::new(u32::MAX, ExecutionError::store("busy"));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let controller = RetryController::new(
            &executor,
            RetryPolicy {
                retry_limit: 3,
                delay: Duration::from_secs(30),
            },
        );
        let result = controller.run("SELECT 1", &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_executor_cancellation_propagates() {
        let executor = FlakyExecutor::new(u32::MAX, ExecutionError::Cancelled);
        let result = RetryController::new(&executor, policy(3))
            .run("SELECT 1", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }
}
