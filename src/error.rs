//! Error types for sql-agent.
//!
//! Errors are split by layer: [`ExecutionError`] for a single query
//! against the data store, [`AgentError`] for a whole conversation run,
//! [`StorageError`] for opening and introspecting the database, and
//! [`CommandError`] for the CLI. [`Error`] unifies them for callers that
//! only need a single type.

use thiserror::Error;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Conversation run failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Database could not be opened or introspected.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// CLI command failed.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors that terminate a conversation run.
///
/// Query failures never appear here directly: they are retried and then
/// fed back into the conversation as text.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured.
    #[error("API key missing: set OPENAI_API_KEY or SQL_AGENT_API_KEY")]
    ApiKeyMissing,

    /// Provider name is not known to the factory.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The configured provider name.
        name: String,
    },

    /// Configuration value is out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What was wrong.
        message: String,
    },

    /// The LLM call failed (network, timeout, rate limit, bad response).
    #[error("LLM request failed: {message}")]
    ApiRequest {
        /// Provider error text.
        message: String,
        /// HTTP status, when the provider exposes one.
        status: Option<u16>,
    },

    /// The model answered without any recognized marker.
    #[error("protocol violation on turn {turn}: response carried no <think>, <query> or <result> marker")]
    ProtocolViolation {
        /// Zero-based turn index of the offending response.
        turn: usize,
        /// The raw response text.
        content: String,
    },

    /// The run was cancelled by the caller.
    #[error("conversation cancelled")]
    Cancelled,

    /// The data store could not be prepared for the run.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AgentError {
    /// Returns `true` for errors raised by the LLM transport.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::ApiRequest { .. })
    }
}

/// Failure of a single query execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The data store reported an error (I/O, syntax, permission).
    #[error("{message}")]
    Store {
        /// Message from the underlying driver.
        message: String,
    },

    /// The statement guard refused the query before it reached the store.
    #[error("query rejected: {reason}")]
    Rejected {
        /// Why the statement was refused.
        reason: String,
    },

    /// Execution was interrupted by cancellation.
    #[error("query cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Creates a store error from any displayable failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Guard rejections are deterministic and cancellation is final.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

/// Errors opening or introspecting the SQLite database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database file does not exist.
    #[error("database not found: {path}")]
    NotFound {
        /// Path that was looked up.
        path: String,
    },

    /// rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required argument or configuration missing.
    #[error("missing argument: {0}")]
    MissingArgument(String),

    /// Command failed while running.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// Output could not be formatted.
    #[error("output format error: {0}")]
    OutputFormat(String),
}
