//! Tagged-protocol SQL agent.
//!
//! The model answers in one of three marked forms: reasoning, a SQL query
//! for the data store, or a final answer. The orchestrator keeps the
//! conversation going until the model concludes, the iteration budget
//! runs out, or queries keep failing.
//!
//! # Architecture
//!
//! ```text
//! ConversationRequest → ConversationOrchestrator
//!   ├── LlmProvider::chat (full history, system instruction first)
//!   ├── parser::classify → TurnOutcome
//!   │   ├── Reasoning      → next turn
//!   │   ├── ToolInvocation → RetryController → QueryExecutor → result fed back
//!   │   ├── FinalAnswer    → RunOutcome
//!   │   └── Malformed      → AgentError::ProtocolViolation
//!   └── TurnObserver::on_turn_completed after every committed turn
//! ```

pub mod client;
pub mod config;
pub mod conversation;
pub mod delay;
pub mod executor;
pub mod guard;
pub mod message;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod retry;

// Re-export key types
pub use client::{ProviderKind, create_provider};
pub use config::AgentConfig;
pub use conversation::{ConversationRequest, RunOutcome, StopReason, Transcript, TurnObserver};
pub use executor::{QueryExecutor, SqliteQueryExecutor};
pub use guard::StatementGuard;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::ConversationOrchestrator;
pub use parser::{TurnOutcome, classify};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use retry::{RetryController, RetryOutcome, RetryPolicy};
