//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls. The conversation loop only ever sees
//! this trait, so tests drive it with scripted providers.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Trait for LLM provider backends.
///
/// Providers are shared and stateless with respect to a conversation: the
/// full message history travels in every request.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] on any transport, timeout or
    /// response-shape failure.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
