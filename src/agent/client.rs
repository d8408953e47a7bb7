//! Provider selection.
//!
//! `SQL_AGENT_PROVIDER` (or [`AgentConfigBuilder::provider`]) names the
//! backend. Names are matched case-insensitively and a few aliases are
//! accepted for OpenAI-compatible servers reached through `base_url`.
//!
//! [`AgentConfigBuilder::provider`]: crate::agent::config::AgentConfigBuilder::provider

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiProvider;
use crate::error::AgentError;

/// Backends the agent can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// `OpenAI` or any server speaking its chat-completions API.
    OpenAi,
}

impl ProviderKind {
    /// Resolves a configured provider name.
    ///
    /// An empty name selects the default backend.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnsupportedProvider`] for unknown names.
    pub fn from_name(name: &str) -> Result<Self, AgentError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "openai" | "openai-compatible" | "compatible" | "ollama" | "vllm" => {
                Ok(Self::OpenAi)
            }
            _ => Err(AgentError::UnsupportedProvider {
                name: name.to_string(),
            }),
        }
    }
}

/// Creates the provider named in `config`, ready to share across runs.
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    match ProviderKind::from_name(&config.provider)? {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiProvider::new(config))),
    }
}
