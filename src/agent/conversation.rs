//! Conversation request, transcript and run outcome types.

use std::sync::Arc;

use serde::Serialize;

use super::message::{ChatMessage, TokenUsage, assistant_message, system_message, user_message};
use super::parser::TurnOutcome;
use crate::error::AgentError;

/// Append-only record of a conversation, visible to the caller.
///
/// Holds the opening request, every model response, and every query
/// result or failure, in the order they happened. Entries can only be
/// added by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<String>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// All entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    pub(crate) fn append(&mut self, entries: impl IntoIterator<Item = String>) {
        self.entries.extend(entries);
    }
}

/// Receives a notification after every completed turn.
///
/// Called synchronously from the conversation loop once the turn's
/// transcript entries are committed and before the inter-turn delay.
/// Implementations should return quickly.
pub trait TurnObserver: Send + Sync {
    /// `turn_index` is zero-based; `transcript` already includes the turn.
    fn on_turn_completed(&self, turn_index: usize, outcome: &TurnOutcome, transcript: &Transcript);
}

impl<F> TurnObserver for F
where
    F: Fn(usize, &TurnOutcome, &Transcript) + Send + Sync,
{
    fn on_turn_completed(&self, turn_index: usize, outcome: &TurnOutcome, transcript: &Transcript) {
        self(turn_index, outcome, transcript);
    }
}

/// A unit of work submitted to the orchestrator.
pub struct ConversationRequest {
    utterance: String,
    iteration_limit: usize,
    /// Transcript of the run, appended to as turns complete.
    pub transcript: Transcript,
    observer: Option<Arc<dyn TurnObserver>>,
}

impl ConversationRequest {
    /// Creates a request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] if `iteration_limit` is zero.
    pub fn new(utterance: impl Into<String>, iteration_limit: usize) -> Result<Self, AgentError> {
        if iteration_limit == 0 {
            return Err(AgentError::InvalidConfig {
                message: "iteration limit must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            utterance: utterance.into(),
            iteration_limit,
            transcript: Transcript::new(),
            observer: None,
        })
    }

    /// Attaches a progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl TurnObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The opening user utterance.
    #[must_use]
    pub fn utterance(&self) -> &str {
        &self.utterance
    }

    /// Maximum LLM round-trips for this request.
    #[must_use]
    pub const fn iteration_limit(&self) -> usize {
        self.iteration_limit
    }

    pub(crate) fn notify(&self, turn_index: usize, outcome: &TurnOutcome) {
        if let Some(observer) = &self.observer {
            observer.on_turn_completed(turn_index, outcome, &self.transcript);
        }
    }
}

impl std::fmt::Debug for ConversationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationRequest")
            .field("utterance", &self.utterance)
            .field("iteration_limit", &self.iteration_limit)
            .field("transcript_len", &self.transcript.len())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Why a run stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a final answer.
    Concluded,
    /// The iteration limit was reached without a final answer.
    BudgetExhausted,
    /// Two consecutive queries exhausted their retries.
    QueryFailed,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Final answer text; empty unless `stop_reason` is `Concluded`.
    pub answer: String,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// LLM round-trips performed.
    pub turns: usize,
    /// Token usage summed over all turns.
    pub usage: TokenUsage,
}

impl RunOutcome {
    /// Whether the run produced a final answer.
    #[must_use]
    pub fn is_conclusive(&self) -> bool {
        self.stop_reason == StopReason::Concluded
    }
}

/// Messages sent to the LLM on each turn.
///
/// The system instruction is fixed at index 0; everything after it mirrors
/// the transcript in append order.
#[derive(Debug, Clone)]
pub(crate) struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub(crate) fn new(system_instruction: &str) -> Self {
        Self {
            messages: vec![system_message(system_instruction)],
        }
    }

    pub(crate) fn push_user(&mut self, content: &str) {
        self.messages.push(user_message(content));
    }

    pub(crate) fn push_assistant(&mut self, content: &str) {
        self.messages.push(assistant_message(content));
    }

    pub(crate) fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}
