//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::client::create_provider;
use crate::agent::config::{AgentConfig, AgentConfigBuilder};
use crate::agent::conversation::{ConversationRequest, Transcript};
use crate::agent::orchestrator::ConversationOrchestrator;
use crate::agent::parser::TurnOutcome;
use crate::agent::prompt::PromptSet;
use crate::cli::output::{AskReport, OutputFormat, format_outcome, format_tables};
use crate::cli::parser::{Cli, Commands};
use crate::error::{CommandError, Result};
use crate::storage::SqliteStore;

/// Parameters for the `ask` command.
#[derive(Debug, Clone, Default)]
pub struct AskParams<'a> {
    /// The question to answer.
    pub question: &'a str,
    /// Maximum LLM round-trips.
    pub iterations: Option<usize>,
    /// Additional attempts for a failing query.
    pub retry_limit: Option<u32>,
    /// Pause between query attempts, in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Pause between turns, in milliseconds.
    pub turn_delay_ms: Option<u64>,
    /// Chat model override.
    pub model: Option<&'a str>,
    /// Tables to advertise; empty means all.
    pub tables: &'a [String],
    /// Disable the statement check.
    pub trust_model: bool,
    /// Include the transcript in the output.
    pub show_transcript: bool,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<&'a Path>,
}

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.db_path();

    match &cli.command {
        Commands::Ask {
            question,
            iterations,
            retry_limit,
            retry_delay_ms,
            turn_delay_ms,
            model,
            table,
            trust_model,
            show_transcript,
            prompt_dir,
        } => {
            let params = AskParams {
                question,
                iterations: *iterations,
                retry_limit: *retry_limit,
                retry_delay_ms: *retry_delay_ms,
                turn_delay_ms: *turn_delay_ms,
                model: model.as_deref(),
                tables: table,
                trust_model: *trust_model,
                show_transcript: *show_transcript,
                prompt_dir: prompt_dir.as_deref(),
            };
            cmd_ask(db_path, &params, format)
        }
        Commands::Tables => cmd_tables(db_path, format),
        Commands::Prompt { table, prompt_dir } => {
            cmd_prompt(db_path, table, prompt_dir.as_deref(), format)
        }
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Opens the database named on the command line.
fn open_store(db_path: Option<&Path>) -> Result<SqliteStore> {
    let path = db_path.ok_or_else(|| {
        CommandError::MissingArgument("--db-path (or SQL_AGENT_DB_PATH)".to_string())
    })?;
    Ok(SqliteStore::new(path)?)
}

/// Applies CLI overrides on top of `builder` and builds the configuration.
fn ask_config(
    builder: AgentConfigBuilder,
    db_path: &Path,
    params: &AskParams<'_>,
) -> Result<AgentConfig> {
    let mut builder = builder
        .db_path(db_path)
        .tables(params.tables.iter().cloned());
    if let Some(n) = params.iterations {
        builder = builder.iteration_limit(n);
    }
    if let Some(n) = params.retry_limit {
        builder = builder.retry_limit(n);
    }
    if let Some(ms) = params.retry_delay_ms {
        builder = builder.retry_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = params.turn_delay_ms {
        builder = builder.turn_delay(Duration::from_millis(ms));
    }
    if let Some(model) = params.model {
        builder = builder.model(model);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    if params.trust_model {
        builder = builder.enforce_read_only(false);
    }

    builder.build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Agent configuration error: {e}")).into()
    })
}

fn log_turn(turn: usize, outcome: &TurnOutcome, transcript: &Transcript) {
    info!(
        turn,
        outcome = outcome.label(),
        transcript_len = transcript.len(),
        "turn completed"
    );
}

fn cmd_ask(
    db_path: Option<&Path>,
    params: &AskParams<'_>,
    format: OutputFormat,
) -> Result<String> {
    let store = open_store(db_path)?;
    let config = ask_config(AgentConfig::builder().from_env(), store.path(), params)?;

    let provider = create_provider(&config).map_err(|e| {
        CommandError::ExecutionFailed(format!("Provider creation failed: {e}"))
    })?;
    let orchestrator = ConversationOrchestrator::from_config(provider, &config)?;

    let mut request =
        ConversationRequest::new(params.question, config.iteration_limit)?.with_observer(log_turn);

    // Create tokio runtime as sync/async bridge
    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })?;

    let cancel = CancellationToken::new();
    let result = rt.block_on(async {
        let trigger = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });
        let result = orchestrator.run(&mut request, &cancel).await;
        watcher.abort();
        result
    });
    let outcome = result?;

    let transcript = params.show_transcript.then_some(&request.transcript);
    match format {
        OutputFormat::Text => Ok(format_outcome(&outcome, transcript)),
        OutputFormat::Json => Ok(format.to_json(&AskReport {
            question: params.question,
            outcome: &outcome,
            transcript,
        })?),
    }
}

fn cmd_tables(db_path: Option<&Path>, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let tables = store.table_names()?;

    match format {
        OutputFormat::Text => Ok(format_tables(&tables)),
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "database": store.path().to_string_lossy(),
            "tables": tables,
        }))?),
    }
}

fn cmd_prompt(
    db_path: Option<&Path>,
    tables: &[String],
    prompt_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<String> {
    let tables = if tables.is_empty() && db_path.is_some() {
        open_store(db_path)?.table_names()?
    } else {
        tables.to_vec()
    };
    let instruction = PromptSet::load(prompt_dir).system_instruction(&tables);

    match format {
        OutputFormat::Text => Ok(format!("{instruction}\n")),
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "tables": tables,
            "system_instruction": instruction,
        }))?),
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "Prompt template already exists in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str("  ");
                output.push_str(
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown"),
                );
                output.push('\n');
            }
            output.push_str("\nEdit system.md to customize the context preamble.\n");
            Ok(output)
        }
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "directory": target_dir.to_string_lossy(),
            "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
            "count": written.len(),
        }))?),
    }
}
