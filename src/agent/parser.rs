//! Classification of tagged model responses.
//!
//! The model talks to the loop through three marker pairs embedded in
//! plain text. Detection is a substring test on the closing tag, not an
//! XML parse: a `</result>` anywhere in the utterance, even inside prose,
//! classifies it as a final answer.

use serde::Serialize;

/// Marker pair delimiting a reasoning note.
pub const THINK: Marker = Marker::new("<think>", "</think>");
/// Marker pair delimiting a SQL query for the loop to execute.
pub const QUERY: Marker = Marker::new("<query>", "</query>");
/// Marker pair delimiting the final answer.
pub const RESULT: Marker = Marker::new("<result>", "</result>");

/// An opening/closing tag pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Opening tag, e.g. `<query>`.
    pub open: &'static str,
    /// Closing tag, e.g. `</query>`.
    pub close: &'static str,
}

impl Marker {
    const fn new(open: &'static str, close: &'static str) -> Self {
        Self { open, close }
    }

    /// Whether the closing tag occurs anywhere in `text`.
    #[must_use]
    pub fn is_present(&self, text: &str) -> bool {
        text.contains(self.close)
    }

    /// Extracts the trimmed payload ending at the first closing tag.
    ///
    /// The payload starts after the last opening tag that precedes the
    /// closing tag, or at the start of the text when there is none.
    /// Returns `None` when the closing tag is absent.
    #[must_use]
    pub fn extract<'a>(&self, text: &'a str) -> Option<&'a str> {
        let end = text.find(self.close)?;
        let head = &text[..end];
        let start = head.rfind(self.open).map_or(0, |i| i + self.open.len());
        Some(head[start..].trim())
    }
}

/// Classification of one assistant utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// A reasoning note; the loop just asks for the next turn.
    Reasoning,
    /// A query for the loop to run against the data store.
    ToolInvocation(String),
    /// The model's final answer.
    FinalAnswer(String),
    /// No recognized marker. Always a protocol violation.
    Malformed,
}

impl TurnOutcome {
    /// Short label for logs and progress output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::ToolInvocation(_) => "tool_invocation",
            Self::FinalAnswer(_) => "final_answer",
            Self::Malformed => "malformed",
        }
    }
}

/// Classifies a raw assistant response.
///
/// Precedence is fixed: final answer, then query, then reasoning. A model
/// that thinks, queries and concludes in one breath has concluded.
#[must_use]
pub fn classify(text: &str) -> TurnOutcome {
    if let Some(answer) = RESULT.extract(text) {
        TurnOutcome::FinalAnswer(answer.to_string())
    } else if let Some(query) = QUERY.extract(text) {
        TurnOutcome::ToolInvocation(query.to_string())
    } else if THINK.is_present(text) {
        TurnOutcome::Reasoning
    } else {
        TurnOutcome::Malformed
    }
}
