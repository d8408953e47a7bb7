//! System instruction for the SQL conversation.
//!
//! The instruction has two parts. The context preamble describes the
//! assistant's role and may be overridden from a template file. The rules
//! section (tables, allowed clauses, forbidden statements, marker usage)
//! is always generated, so an override cannot drop the protocol.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use super::guard::FORBIDDEN;
use super::parser::{QUERY, RESULT, THINK};

/// Default context preamble.
pub const DEFAULT_CONTEXT: &str = "You are a helpful assistant that answers questions about the \
company's data by searching the company storage. You know SQL (SQLite dialect) and use it to \
look up the information that matches the request. You can inspect how tables are built and how \
they relate to each other by querying sqlite_master.";

/// Clause types the model may use.
pub const ALLOWED_CLAUSES: &[&str] = &[
    "SELECT", "JOIN", "WHERE", "GROUP BY", "HAVING", "ORDER BY", "LIMIT",
];

/// Default prompt directory under the user's home.
const DEFAULT_PROMPT_DIR: &str = ".config/sql-agent/prompts";

/// Filename of the context preamble template.
const SYSTEM_FILENAME: &str = "system.md";

/// Loaded prompt templates.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Context preamble placed before the generated rules.
    pub context: String,
}

impl PromptSet {
    /// Loads templates from the given directory, falling back to the
    /// compiled-in default.
    ///
    /// Resolution order for the directory:
    /// 1. Explicit `prompt_dir` argument
    /// 2. `SQL_AGENT_PROMPT_DIR` environment variable
    /// 3. `~/.config/sql-agent/prompts/`
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let context = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("SQL_AGENT_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir)
            .map(|dir| dir.join(SYSTEM_FILENAME))
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_string());

        Self { context }
    }

    /// Returns the compiled-in default without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            context: DEFAULT_CONTEXT.to_string(),
        }
    }

    /// Writes the default template to `dir` unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(SYSTEM_FILENAME);
        if path.exists() {
            return Ok(Vec::new());
        }
        std::fs::write(&path, format!("{DEFAULT_CONTEXT}\n"))?;
        Ok(vec![path])
    }

    /// Returns the default prompt directory under the user's home.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }

    /// Renders the full system instruction for the given tables.
    #[must_use]
    pub fn system_instruction(&self, tables: &[String]) -> String {
        build_system_instruction(&self.context, tables)
    }
}

/// Builds the system instruction from a context preamble and table list.
#[must_use]
pub fn build_system_instruction(context: &str, tables: &[String]) -> String {
    let mut prompt = format!("<context>\n{context}\n</context>\n\n<rules>\n");
    let mut n = 0;
    let mut rule = |prompt: &mut String, text: &str| {
        n += 1;
        let _ = writeln!(prompt, "{n}. {text}");
    };

    rule(
        &mut prompt,
        &format!(
            "Put each step of your reasoning in {} {} tags. Use a new pair for every thought.",
            THINK.open, THINK.close
        ),
    );
    rule(
        &mut prompt,
        &format!(
            "Put exactly one SQL query in {} {} tags when you need data. The query result \
             is sent back to you as the next message, values separated by spaces.",
            QUERY.open, QUERY.close
        ),
    );
    rule(
        &mut prompt,
        &format!(
            "Put your final answer in {} {} tags. Nothing after it will be read.",
            RESULT.open, RESULT.close
        ),
    );
    rule(
        &mut prompt,
        "Every response must contain one of these tags. A response without tags ends the \
         conversation with an error.",
    );
    rule(
        &mut prompt,
        &format!(
            "If the request is unclear or unrelated to the company storage, answer in {} {} \
             tags that you can't help with that.",
            RESULT.open, RESULT.close
        ),
    );
    let table_list = if tables.is_empty() {
        "(none known; inspect sqlite_master)".to_string()
    } else {
        tables.join(", ")
    };
    rule(
        &mut prompt,
        &format!("Available tables in storage are: {table_list}"),
    );
    rule(
        &mut prompt,
        &format!("You may use these clauses: {}.", ALLOWED_CLAUSES.join(", ")),
    );
    rule(
        &mut prompt,
        &format!("It is forbidden to use: {}.", FORBIDDEN.join(", ")),
    );
    rule(
        &mut prompt,
        "If a query fails you receive the error text. Fix the query or explain the problem.",
    );

    prompt.push_str("</rules>");
    prompt
}
