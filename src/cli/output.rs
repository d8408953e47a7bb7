//! Output formatting for CLI commands.

use std::fmt::Write;

use serde::Serialize;

use crate::agent::{RunOutcome, StopReason, Transcript};
use crate::error::CommandError;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, falling back to text for anything unknown.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes a value as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::OutputFormat`] if the value cannot be
    /// represented as JSON.
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> Result<String, CommandError> {
        serde_json::to_string_pretty(value).map_err(|e| CommandError::OutputFormat(e.to_string()))
    }
}

/// JSON shape of an `ask` run.
#[derive(Debug, Serialize)]
pub struct AskReport<'a> {
    /// The question as asked.
    pub question: &'a str,
    /// Outcome of the run.
    #[serde(flatten)]
    pub outcome: &'a RunOutcome,
    /// Transcript, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<&'a Transcript>,
}

/// Renders an `ask` run as text.
#[must_use]
pub fn format_outcome(outcome: &RunOutcome, transcript: Option<&Transcript>) -> String {
    let mut output = match outcome.stop_reason {
        StopReason::Concluded => outcome.answer.clone(),
        StopReason::BudgetExhausted => format!(
            "No conclusive answer: iteration limit reached after {} turn(s).",
            outcome.turns
        ),
        StopReason::QueryFailed => {
            "No conclusive answer: two consecutive queries failed.".to_string()
        }
    };

    let _ = write!(
        output,
        "\n\n---\nTurns: {} | Stop: {} | Tokens: {}",
        outcome.turns,
        stop_label(outcome.stop_reason),
        outcome.usage.total_tokens
    );

    if let Some(transcript) = transcript {
        output.push_str("\n\nTranscript:");
        for (idx, entry) in transcript.entries().iter().enumerate() {
            let _ = write!(output, "\n[{idx}] {entry}");
        }
    }
    output.push('\n');
    output
}

/// Renders a table list as text, one name per line.
#[must_use]
pub fn format_tables(tables: &[String]) -> String {
    if tables.is_empty() {
        return "No tables found.\n".to_string();
    }
    let mut output = String::new();
    for table in tables {
        output.push_str(table);
        output.push('\n');
    }
    output
}

const fn stop_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Concluded => "concluded",
        StopReason::BudgetExhausted => "budget exhausted",
        StopReason::QueryFailed => "query failed",
    }
}
