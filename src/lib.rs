//! # sql-agent
//!
//! An LLM agent that answers natural-language questions about a SQLite
//! database by issuing read-only SQL.
//!
//! The model speaks a small tagged protocol: `<think>` for reasoning,
//! `<query>` for a SQL statement the agent should run, and `<result>` for
//! the final answer. Query results (or failures, after bounded retries) are
//! fed back as the next message until the model concludes or the iteration
//! budget is spent.
//!
//! ## Example
//!
//! ```no_run
//! use sql_agent::agent::{AgentConfig, ConversationOrchestrator, ConversationRequest, create_provider};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgentConfig::builder()
//!     .from_env()
//!     .db_path("company.db")
//!     .build()?;
//! let provider = create_provider(&config)?;
//! let orchestrator = ConversationOrchestrator::from_config(provider, &config)?;
//!
//! let mut request = ConversationRequest::new("Who works in Department X?", config.iteration_limit)?;
//! let outcome = orchestrator.run(&mut request, &CancellationToken::new()).await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod error;
pub mod storage;

// Re-export commonly used types
pub use agent::{
    AgentConfig, ConversationOrchestrator, ConversationRequest, RunOutcome, StopReason,
    TurnOutcome,
};
pub use error::{AgentError, CommandError, Error, ExecutionError, Result, StorageError};
pub use storage::SqliteStore;
