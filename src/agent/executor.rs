//! Query executor that runs model-authored SQL against the data store.
//!
//! Each call opens its own read-only connection on a blocking thread and
//! drops it before returning, on success, failure and cancellation alike.

use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::guard::StatementGuard;
use crate::error::ExecutionError;
use crate::storage::{SqliteStore, flatten_query};

/// Maximum characters of flattened result text returned to the model.
const MAX_RESULT_CHARS: usize = 20_000;

/// Executes a single query and returns its flattened text.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs `query` and returns the flattened result set.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Store`] for any database failure,
    /// [`ExecutionError::Rejected`] if a guard refused the statement, and
    /// [`ExecutionError::Cancelled`] if `cancel` fired first.
    async fn execute(&self, query: &str, cancel: &CancellationToken)
    -> Result<String, ExecutionError>;
}

/// [`QueryExecutor`] over a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteQueryExecutor {
    store: SqliteStore,
    guard: Option<StatementGuard>,
}

impl SqliteQueryExecutor {
    /// Creates an executor with the statement guard enabled.
    #[must_use]
    pub const fn new(store: SqliteStore) -> Self {
        Self {
            store,
            guard: Some(StatementGuard),
        }
    }

    /// Creates an executor that forwards every query to the database.
    ///
    /// The connection is still opened read-only.
    #[must_use]
    pub const fn trusting(store: SqliteStore) -> Self {
        Self { store, guard: None }
    }
}

#[async_trait]
impl QueryExecutor for SqliteQueryExecutor {
    async fn execute(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutionError> {
        if let Some(guard) = self.guard {
            guard.check(query)?;
        }
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let started = Instant::now();
        let store = self.store.clone();
        let conn = tokio::task::spawn_blocking(move || store.open())
            .await
            .map_err(|e| ExecutionError::store(format!("connection task failed: {e}")))?
            .map_err(ExecutionError::store)?;

        let interrupt = conn.get_interrupt_handle();
        let sql = query.to_string();
        let task = tokio::task::spawn_blocking(move || flatten_query(&conn, &sql));

        let text = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                interrupt.interrupt();
                return Err(ExecutionError::Cancelled);
            }

            joined = task => joined
                .map_err(|e| ExecutionError::store(format!("query task failed: {e}")))?
                .map_err(ExecutionError::store)?,
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis(),
            result_len = text.len(),
            "query executed"
        );
        Ok(truncate_result(text))
    }
}

fn truncate_result(mut text: String) -> String {
    if let Some((idx, _)) = text.char_indices().nth(MAX_RESULT_CHARS) {
        text.truncate(idx);
        text.push_str(" …[truncated]");
    }
    text
}
