//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// sql-agent: answer questions about a SQLite database with an LLM.
///
/// The model reasons in `<think>` tags, asks for data in `<query>` tags and
/// answers in `<result>` tags. Queries run against a read-only connection.
#[derive(Parser, Debug)]
#[command(name = "sql-agent")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the SQLite database to query.
    #[arg(short, long, env = "SQL_AGENT_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question about the database.
    ///
    /// Runs a conversation with the model until it answers, the iteration
    /// budget is spent, or two queries in a row fail. Requires an
    /// OpenAI-compatible API key.
    #[command(after_help = r#"Examples:
  sql-agent -d company.db ask "List all employees in Department X"
  sql-agent -d company.db ask "Average salary per department" --iterations 15
  sql-agent -d company.db ask "Who joined last?" --table Employees --show-transcript
  sql-agent -d company.db --format json ask "How many projects?" | jq .answer
  OPENAI_API_KEY=sk-... sql-agent ask "Headcount by city" -v
"#)]
    Ask {
        /// The question to answer.
        question: String,

        /// Maximum LLM round-trips.
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Additional attempts for a failing query.
        #[arg(long)]
        retry_limit: Option<u32>,

        /// Pause between query attempts, in milliseconds.
        #[arg(long)]
        retry_delay_ms: Option<u64>,

        /// Pause between turns, in milliseconds.
        #[arg(long)]
        turn_delay_ms: Option<u64>,

        /// Chat model to use.
        #[arg(short, long)]
        model: Option<String>,

        /// Table to advertise to the model (repeatable). Defaults to every
        /// table in the database.
        #[arg(short, long = "table")]
        table: Vec<String>,

        /// Skip the statement check and send queries straight to the
        /// (read-only) connection.
        #[arg(long)]
        trust_model: bool,

        /// Print the full transcript after the answer.
        #[arg(long)]
        show_transcript: bool,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,
    },

    /// List the tables in the database.
    Tables,

    /// Print the system instruction the model would receive.
    #[command(after_help = r#"Examples:
  sql-agent -d company.db prompt                     # Tables from the database
  sql-agent prompt --table Employees --table Depts   # Explicit tables, no database
"#)]
    Prompt {
        /// Table to advertise (repeatable).
        #[arg(short, long = "table")]
        table: Vec<String>,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,
    },

    /// Write the default prompt template to disk.
    ///
    /// Creates `system.md` in the prompt directory so the context preamble
    /// can be customized without recompiling.
    #[command(name = "init-prompts")]
    #[command(after_help = r#"Examples:
  sql-agent init-prompts                      # Write to ~/.config/sql-agent/prompts/
  sql-agent init-prompts --dir ./my-prompts   # Write to custom directory
"#)]
    InitPrompts {
        /// Target directory for prompt templates.
        ///
        /// Defaults to `~/.config/sql-agent/prompts/`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

impl Cli {
    /// Returns the database path, if one was given.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}
