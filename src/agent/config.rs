//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default chat model.
const DEFAULT_MODEL: &str = "gpt-4o";
/// Default maximum LLM round-trips per conversation.
pub const DEFAULT_ITERATION_LIMIT: usize = 10;
/// Default additional query attempts after the first failure.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;
/// Default pause between query attempts, in milliseconds.
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
/// Default pause between conversation turns, in milliseconds.
const DEFAULT_TURN_DELAY_MS: u64 = 250;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default completion token cap.
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Chat model identifier.
    pub model: String,
    /// SQLite database the agent may query.
    pub db_path: Option<PathBuf>,
    /// Maximum LLM round-trips per conversation.
    pub iteration_limit: usize,
    /// Additional query attempts after the first failure.
    pub retry_limit: u32,
    /// Fixed pause between query attempts.
    pub retry_delay: Duration,
    /// Fixed pause between conversation turns.
    pub turn_delay: Duration,
    /// Request timeout for a single LLM call.
    pub timeout: Duration,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Sampling temperature. Zero is not sent, leaving the provider default.
    pub temperature: f32,
    /// Tables advertised to the model. Empty means introspect the database.
    pub tables: Vec<String>,
    /// Reject non-`SELECT` statements before they reach the database.
    ///
    /// The connection is read-only either way; this only controls whether
    /// the model gets an early, named rejection instead of a driver error.
    pub enforce_read_only: bool,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    db_path: Option<PathBuf>,
    iteration_limit: Option<usize>,
    retry_limit: Option<u32>,
    retry_delay: Option<Duration>,
    turn_delay: Option<Duration>,
    timeout: Option<Duration>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    tables: Option<Vec<String>>,
    enforce_read_only: Option<bool>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("SQL_AGENT_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("SQL_AGENT_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("SQL_AGENT_BASE_URL"))
                .ok();
        }
        if self.model.is_none() {
            self.model = std::env::var("SQL_AGENT_MODEL").ok();
        }
        if self.db_path.is_none() {
            self.db_path = std::env::var("SQL_AGENT_DB_PATH").ok().map(PathBuf::from);
        }
        if self.iteration_limit.is_none() {
            self.iteration_limit = env_parse("SQL_AGENT_ITERATIONS");
        }
        if self.retry_limit.is_none() {
            self.retry_limit = env_parse("SQL_AGENT_RETRY_LIMIT");
        }
        if self.retry_delay.is_none() {
            self.retry_delay = env_parse("SQL_AGENT_RETRY_DELAY_MS").map(Duration::from_millis);
        }
        if self.turn_delay.is_none() {
            self.turn_delay = env_parse("SQL_AGENT_TURN_DELAY_MS").map(Duration::from_millis);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("SQL_AGENT_PROMPT_DIR")
                .ok()
                .map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the database path.
    #[must_use]
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Sets the iteration limit.
    #[must_use]
    pub const fn iteration_limit(mut self, n: usize) -> Self {
        self.iteration_limit = Some(n);
        self
    }

    /// Sets the retry limit.
    #[must_use]
    pub const fn retry_limit(mut self, n: u32) -> Self {
        self.retry_limit = Some(n);
        self
    }

    /// Sets the pause between query attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets the pause between turns.
    #[must_use]
    pub const fn turn_delay(mut self, delay: Duration) -> Self {
        self.turn_delay = Some(delay);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the completion token cap.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the tables advertised to the model.
    #[must_use]
    pub fn tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Enables or disables the statement guard.
    #[must_use]
    pub const fn enforce_read_only(mut self, enforce: bool) -> Self {
        self.enforce_read_only = Some(enforce);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, and
    /// [`AgentError::InvalidConfig`] for a zero iteration limit.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        let iteration_limit = self.iteration_limit.unwrap_or(DEFAULT_ITERATION_LIMIT);
        if iteration_limit == 0 {
            return Err(AgentError::InvalidConfig {
                message: "iteration limit must be greater than zero".to_string(),
            });
        }

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            db_path: self.db_path,
            iteration_limit,
            retry_limit: self.retry_limit.unwrap_or(DEFAULT_RETRY_LIMIT),
            retry_delay: self
                .retry_delay
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_DELAY_MS)),
            turn_delay: self
                .turn_delay
                .unwrap_or(Duration::from_millis(DEFAULT_TURN_DELAY_MS)),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(0.0),
            tables: self.tables.unwrap_or_default(),
            enforce_read_only: self.enforce_read_only.unwrap_or(true),
            prompt_dir: self.prompt_dir,
        })
    }
}
