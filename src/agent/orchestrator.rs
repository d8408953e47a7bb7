//! Conversation loop between the model and the data store.
//!
//! Each turn sends the full message history to the model, classifies the
//! reply by its markers and acts on it: reasoning continues, a query is run
//! through the retry controller and its result fed back, a final answer
//! ends the run. A reply with no markers is a protocol violation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::config::AgentConfig;
use super::conversation::{ConversationRequest, ConversationState, RunOutcome, StopReason};
use super::delay::pause;
use super::executor::{QueryExecutor, SqliteQueryExecutor};
use super::message::{ChatRequest, ChatResponse, TokenUsage};
use super::parser::{TurnOutcome, classify};
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::retry::{RetryController, RetryPolicy};
use crate::error::AgentError;
use crate::storage::SqliteStore;

/// Consecutive exhausted queries that end a run.
const MAX_CONSECUTIVE_QUERY_FAILURES: u32 = 2;

/// Drives conversations between an [`LlmProvider`] and a [`QueryExecutor`].
///
/// Holds no per-run state apart from a run counter, so one orchestrator
/// can serve concurrent runs.
pub struct ConversationOrchestrator {
    provider: Arc<dyn LlmProvider>,
    executor: Arc<dyn QueryExecutor>,
    system_instruction: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
    turn_delay: Duration,
    runs: AtomicU64,
}

impl ConversationOrchestrator {
    /// Creates an orchestrator with an explicit system instruction.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        executor: Arc<dyn QueryExecutor>,
        config: &AgentConfig,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            executor,
            system_instruction: system_instruction.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry: RetryPolicy {
                retry_limit: config.retry_limit,
                delay: config.retry_delay,
            },
            turn_delay: config.turn_delay,
            runs: AtomicU64::new(0),
        }
    }

    /// Creates an orchestrator over the SQLite database in `config.db_path`.
    ///
    /// Advertised tables come from `config.tables`, or from the database
    /// schema when that list is empty. The context preamble is loaded from
    /// `config.prompt_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] if no database path is set and
    /// [`AgentError::Storage`] if the database cannot be opened.
    pub fn from_config(
        provider: Arc<dyn LlmProvider>,
        config: &AgentConfig,
    ) -> Result<Self, AgentError> {
        let path = config
            .db_path
            .as_deref()
            .ok_or_else(|| AgentError::InvalidConfig {
                message: "no database path configured (set --db-path or SQL_AGENT_DB_PATH)"
                    .to_string(),
            })?;
        let store = SqliteStore::new(path)?;

        let tables = if config.tables.is_empty() {
            store.table_names()?
        } else {
            config.tables.clone()
        };
        debug!(path = %store.path().display(), ?tables, "advertising tables");

        let executor: Arc<dyn QueryExecutor> = if config.enforce_read_only {
            Arc::new(SqliteQueryExecutor::new(store))
        } else {
            warn!("statement guard disabled; queries go straight to the read-only connection");
            Arc::new(SqliteQueryExecutor::trusting(store))
        };

        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let instruction = prompts.system_instruction(&tables);
        Ok(Self::new(provider, executor, config, instruction))
    }

    /// The system instruction sent as the first message of every run.
    #[must_use]
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Runs one conversation to completion.
    ///
    /// Entries are appended to `request.transcript` one turn at a time; a
    /// turn interrupted by cancellation or a transport failure leaves no
    /// entries behind. The observer, if any, is called after each turn that
    /// completes normally, including the concluding one.
    ///
    /// # Errors
    ///
    /// - [`AgentError::ApiRequest`] if an LLM call fails
    /// - [`AgentError::ProtocolViolation`] if a reply carries no marker
    /// - [`AgentError::Cancelled`] if `cancel` fires
    pub async fn run(
        &self,
        request: &mut ConversationRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        let run_id = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("conversation", run = run_id);
        self.drive(request, cancel).instrument(span).await
    }

    async fn drive(
        &self,
        request: &mut ConversationRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        let limit = request.iteration_limit();
        info!(iteration_limit = limit, "conversation started");

        let mut state = ConversationState::new(&self.system_instruction);
        let mut opening = Some(request.utterance().to_string());
        let mut usage = TokenUsage::default();
        let mut failure_streak: u32 = 0;
        let mut turns: usize = 0;

        let (answer, stop_reason) = loop {
            let mut staged: Vec<String> = Vec::with_capacity(3);
            if let Some(utterance) = opening.take() {
                state.push_user(&utterance);
                staged.push(utterance);
            }

            let response = self.complete(&state, cancel).await?;
            usage.accumulate(response.usage);
            state.push_assistant(&response.content);

            let outcome = classify(&response.content);
            debug!(turn = turns, outcome = outcome.label(), "turn classified");
            staged.push(response.content);

            let mut stop = None;
            match &outcome {
                TurnOutcome::FinalAnswer(answer) => {
                    stop = Some((answer.clone(), StopReason::Concluded));
                }
                TurnOutcome::Reasoning => {}
                TurnOutcome::ToolInvocation(query) => {
                    let result = RetryController::new(self.executor.as_ref(), self.retry)
                        .run(query, cancel)
                        .await?;
                    let feedback = result.message();
                    if result.is_exhausted() {
                        failure_streak += 1;
                        warn!(streak = failure_streak, "query exhausted its attempts");
                        if failure_streak >= MAX_CONSECUTIVE_QUERY_FAILURES {
                            stop = Some((String::new(), StopReason::QueryFailed));
                        }
                    } else {
                        failure_streak = 0;
                    }
                    state.push_user(&feedback);
                    staged.push(feedback);
                }
                TurnOutcome::Malformed => {
                    let content = staged.last().cloned().unwrap_or_default();
                    request.transcript.append(staged);
                    warn!(turn = turns, "reply carried no protocol marker");
                    return Err(AgentError::ProtocolViolation {
                        turn: turns,
                        content,
                    });
                }
            }

            request.transcript.append(staged);
            request.notify(turns, &outcome);
            turns += 1;

            if let Some(stop) = stop {
                break stop;
            }
            if turns == limit {
                break (String::new(), StopReason::BudgetExhausted);
            }
            pause(self.turn_delay, cancel).await?;
        };

        info!(
            turns,
            stop_reason = ?stop_reason,
            total_tokens = usage.total_tokens,
            "conversation finished"
        );
        Ok(RunOutcome {
            answer,
            stop_reason,
            turns,
            usage,
        })
    }

    /// Sends the current state to the model, racing it against `cancel`.
    async fn complete(
        &self,
        state: &ConversationState,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: state.messages().to_vec(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AgentError::Cancelled),
            response = self.provider.chat(&request) => response,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::conversation::Transcript;
    use crate::agent::message::Role;
    use crate::error::ExecutionError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    /// Replays canned replies and records every request.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<ChatResponse, AgentError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Self::with_results(
                replies
                    .iter()
                    .map(|r| Ok(ChatResponse::text(*r)))
                    .collect(),
            )
        }

        fn with_results(replies: Vec<Result<ChatResponse, AgentError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or_default()
        }

        fn request(&self, idx: usize) -> ChatRequest {
            self.requests
                .lock()
                .ok()
                .and_then(|r| r.get(idx).cloned())
                .unwrap_or_else(|| panic!("no request {idx}"))
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            if let Ok(mut log) = self.requests.lock() {
                log.push(request.clone());
            }
            self.replies
                .lock()
                .ok()
                .and_then(|mut r| r.pop_front())
                .unwrap_or_else(|| Ok(ChatResponse::text("<think>still thinking</think>")))
        }
    }

    /// Never answers.
    struct StalledProvider;

    #[async_trait]
    impl LlmProvider for StalledProvider {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            std::future::pending().await
        }
    }

    /// Returns queued results, then an empty success.
    struct ScriptedExecutor {
        results: Mutex<VecDeque<Result<String, ExecutionError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new(results: Vec<Result<String, ExecutionError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Self::new(vec![Err(ExecutionError::store(message)); 64])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _query: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .ok()
                .and_then(|mut r| r.pop_front())
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    /// Blocks every query until the run is cancelled.
    struct StalledExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryExecutor for StalledExecutor {
        async fn execute(
            &self,
            _query: &str,
            cancel: &CancellationToken,
        ) -> Result<String, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            cancel.cancelled().await;
            Err(ExecutionError::Cancelled)
        }
    }

    fn config(retry_limit: u32) -> AgentConfig {
        AgentConfig::builder()
            .api_key("test")
            .retry_limit(retry_limit)
            .retry_delay(Duration::ZERO)
            .turn_delay(Duration::ZERO)
            .build()
            .unwrap_or_else(|e| panic!("config failed: {e}"))
    }

    fn orchestrator(
        provider: Arc<dyn LlmProvider>,
        executor: Arc<dyn QueryExecutor>,
        retry_limit: u32,
    ) -> ConversationOrchestrator {
        ConversationOrchestrator::new(provider, executor, &config(retry_limit), "SYSTEM")
    }

    fn request(utterance: &str, limit: usize) -> ConversationRequest {
        ConversationRequest::new(utterance, limit).unwrap_or_else(|e| panic!("request failed: {e}"))
    }

    #[tokio::test]
    async fn test_query_then_result() {
        let provider = ScriptedProvider::new(&[
            "<query>SELECT Name FROM Employees WHERE Dept='X'</query>",
            "<result>Alice Bob</result>",
        ]);
        let executor = ScriptedExecutor::new(vec![Ok("Alice Bob".to_string())]);
        let orch = orchestrator(provider.clone(), executor.clone(), 3);

        let mut req = request("List all employees in Department X", 5);
        let outcome = orch
            .run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));

        assert_eq!(outcome.answer, "Alice Bob");
        assert_eq!(outcome.stop_reason, StopReason::Concluded);
        assert_eq!(outcome.turns, 2);
        assert_eq!(provider.calls(), 2);
        assert_eq!(executor.calls(), 1);
        assert_eq!(
            req.transcript.entries(),
            [
                "List all employees in Department X",
                "<query>SELECT Name FROM Employees WHERE Dept='X'</query>",
                "Alice Bob",
                "<result>Alice Bob</result>",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_request_carries_history() {
        let provider = ScriptedProvider::new(&[
            "<query>SELECT 1</query>",
            "<result>one</result>",
        ]);
        let executor = ScriptedExecutor::new(vec![Ok("1".to_string())]);
        let orch = orchestrator(provider.clone(), executor, 3);

        let mut req = request("count", 5);
        orch.run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));

        let first = provider.request(0);
        assert_eq!(first.messages.len(), 2);
        assert_eq!(first.messages[0].role, Role::System);
        assert_eq!(first.messages[0].content, "SYSTEM");

        let second = provider.request(1);
        let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(second.messages[3].content, "1");
    }

    #[tokio::test]
    async fn test_malformed_reply_is_protocol_violation() {
        let provider = ScriptedProvider::new(&["I think the answer is 42."]);
        let executor = ScriptedExecutor::new(Vec::new());
        let orch = orchestrator(provider.clone(), executor, 3);

        let mut req = request("question", 5);
        let err = orch
            .run(&mut req, &CancellationToken::new())
            .await
            .err()
            .unwrap_or_else(|| panic!("expected protocol violation"));

        assert!(matches!(err, AgentError::ProtocolViolation { turn: 0, .. }));
        assert_eq!(provider.calls(), 1);
        assert_eq!(req.transcript.len(), 2);
        assert_eq!(req.transcript.last(), Some("I think the answer is 42."));
    }

    #[tokio::test]
    async fn test_exhausted_query_feeds_back_and_continues() {
        let provider = ScriptedProvider::new(&[
            "<query>SELECT * FROM Staff</query>",
            "<result>No such table.</result>",
        ]);
        let executor = ScriptedExecutor::failing("no such table: Staff");
        let orch = orchestrator(provider.clone(), executor.clone(), 3);

        let mut req = request("who works here", 5);
        let outcome = orch
            .run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));

        assert_eq!(executor.calls(), 4);
        assert_eq!(provider.calls(), 2);
        assert_eq!(outcome.stop_reason, StopReason::Concluded);
        assert_eq!(
            req.transcript.entries()[2],
            "Query failed after 4 attempt(s): no such table: Staff"
        );
    }

    #[tokio::test]
    async fn test_second_consecutive_exhaustion_stops() {
        let provider = ScriptedProvider::new(&[
            "<query>SELECT * FROM Staff</query>",
            "<query>SELECT * FROM People</query>",
            "<result>never reached</result>",
        ]);
        let executor = ScriptedExecutor::failing("no such table");
        let orch = orchestrator(provider.clone(), executor.clone(), 1);

        let mut req = request("who works here", 10);
        let outcome = orch
            .run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));

        assert_eq!(outcome.stop_reason, StopReason::QueryFailed);
        assert!(outcome.answer.is_empty());
        assert_eq!(provider.calls(), 2);
        assert_eq!(executor.calls(), 4);
        assert_eq!(req.transcript.len(), 5);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let provider = ScriptedProvider::new(&[
            "<query>bad</query>",
            "<query>good</query>",
            "<query>bad again</query>",
            "<result>done</result>",
        ]);
        let executor = ScriptedExecutor::new(vec![
            Err(ExecutionError::store("syntax error")),
            Ok("rows".to_string()),
            Err(ExecutionError::store("syntax error")),
        ]);
        let orch = orchestrator(provider.clone(), executor, 0);

        let mut req = request("q", 10);
        let outcome = orch
            .run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert_eq!(outcome.stop_reason, StopReason::Concluded);
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_reasoning_only_exhausts_budget() {
        let provider = ScriptedProvider::new(&["<think>Let me consider the schema.</think>"]);
        let executor = ScriptedExecutor::new(Vec::new());
        let orch = orchestrator(provider.clone(), executor, 3);

        let mut req = request("question", 1);
        let outcome = orch
            .run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));

        assert_eq!(outcome.stop_reason, StopReason::BudgetExhausted);
        assert!(outcome.answer.is_empty());
        assert_eq!(outcome.turns, 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_iteration_limit() {
        for limit in 1..6 {
            let provider = ScriptedProvider::new(&[]);
            let executor = ScriptedExecutor::new(Vec::new());
            let orch = orchestrator(provider.clone(), executor, 3);

            let mut req = request("question", limit);
            let outcome = orch
                .run(&mut req, &CancellationToken::new())
                .await
                .unwrap_or_else(|e| panic!("run failed: {e}"));
            assert_eq!(provider.calls(), limit);
            assert_eq!(outcome.turns, limit);
            assert_eq!(req.transcript.len(), limit + 1);
        }
    }

    #[tokio::test]
    async fn test_consecutive_reasoning_turns_send_assistant_messages() {
        let provider = ScriptedProvider::new(&[
            "<think>first</think>",
            "<think>second</think>",
            "<result>ok</result>",
        ]);
        let orch = orchestrator(provider.clone(), ScriptedExecutor::new(Vec::new()), 3);

        let mut req = request("q", 5);
        orch.run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));

        let third = provider.request(2);
        let roles: Vec<Role> = third.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_terminal() {
        let provider = ScriptedProvider::with_results(vec![
            Ok(ChatResponse::text("<think>hmm</think>")),
            Err(AgentError::ApiRequest {
                message: "rate limited".to_string(),
                status: Some(429),
            }),
        ]);
        let orch = orchestrator(provider.clone(), ScriptedExecutor::new(Vec::new()), 3);

        let mut req = request("q", 5);
        let err = orch
            .run(&mut req, &CancellationToken::new())
            .await
            .err()
            .unwrap_or_else(|| panic!("expected transport error"));
        assert!(err.is_transport());
        assert_eq!(req.transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_observer_sees_each_completed_turn() {
        let provider = ScriptedProvider::new(&[
            "<think>plan</think>",
            "<query>SELECT 1</query>",
            "<result>1</result>",
        ]);
        let executor = ScriptedExecutor::new(vec![Ok("1".to_string())]);
        let orch = orchestrator(provider, executor, 3);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut req = request("q", 5).with_observer(
            move |turn: usize, outcome: &TurnOutcome, transcript: &Transcript| {
                if let Ok(mut v) = sink.lock() {
                    v.push((turn, outcome.label(), transcript.len()));
                }
            },
        );
        orch.run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));

        let seen = seen.lock().map(|v| v.clone()).unwrap_or_default();
        assert_eq!(
            seen,
            vec![
                (0, "reasoning", 2),
                (1, "tool_invocation", 4),
                (2, "final_answer", 5),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_during_llm_call_commits_nothing() {
        let orch = orchestrator(
            Arc::new(StalledProvider),
            ScriptedExecutor::new(Vec::new()),
            3,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let mut req = request("q", 5);
        let result = orch.run(&mut req, &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert!(req.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_query_drops_the_turn() {
        let provider = ScriptedProvider::new(&["<think>a</think>", "<query>SELECT 1</query>"]);
        let executor = Arc::new(StalledExecutor {
            calls: AtomicUsize::new(0),
        });
        let orch = orchestrator(provider.clone(), executor.clone(), 3);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut req = request("q", 5);
        let result = orch.run(&mut req, &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(provider.calls(), 2);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(req.transcript.entries(), ["q", "<think>a</think>"]);
    }

    #[tokio::test]
    async fn test_cancel_during_turn_delay_keeps_completed_turn() {
        let provider = ScriptedProvider::new(&["<think>a</think>"]);
        let cfg = AgentConfig::builder()
            .api_key("test")
            .turn_delay(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| panic!("config failed: {e}"));
        let orch = ConversationOrchestrator::new(
            provider.clone(),
            ScriptedExecutor::new(Vec::new()),
            &cfg,
            "SYSTEM",
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut req = request("q", 5);
        let result = orch.run(&mut req, &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(provider.calls(), 1);
        assert_eq!(req.transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_usage_accumulates() {
        let mut first = ChatResponse::text("<think>a</think>");
        first.usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let mut second = ChatResponse::text("<result>b</result>");
        second.usage = TokenUsage {
            prompt_tokens: 20,
            completion_tokens: 5,
            total_tokens: 25,
        };
        let provider = ScriptedProvider::with_results(vec![Ok(first), Ok(second)]);
        let orch = orchestrator(provider, ScriptedExecutor::new(Vec::new()), 3);

        let mut req = request("q", 5);
        let outcome = orch
            .run(&mut req, &CancellationToken::new())
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert_eq!(outcome.usage.total_tokens, 40);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let provider = ScriptedProvider::new(&[]);
        let orch = Arc::new(orchestrator(
            provider.clone(),
            ScriptedExecutor::new(Vec::new()),
            3,
        ));

        let mut handles = Vec::new();
        for i in 0..4 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                let mut req = request(&format!("q{i}"), 2);
                let outcome = orch.run(&mut req, &CancellationToken::new()).await;
                (outcome.map(|o| o.turns).ok(), req.transcript.len())
            }));
        }
        for handle in handles {
            let (turns, len) = handle.await.unwrap_or_else(|e| panic!("join failed: {e}"));
            assert_eq!(turns, Some(2));
            assert_eq!(len, 3);
        }
        assert_eq!(provider.calls(), 8);
    }
}
