//! Read-only statement guard.
//!
//! A coarse lexical check run before a model-authored query reaches the
//! database. It does not parse SQL: it skips string literals, quoted
//! identifiers and comments, then looks at bare words and semicolons.

use crate::error::ExecutionError;

/// Leading keywords a query may start with.
const ALLOWED_LEADING: &[&str] = &["SELECT", "WITH"];

/// Statement types the model is told not to use. None may appear as a
/// bare word anywhere in a query.
pub const FORBIDDEN: &[&str] = &[
    "DELETE", "UPDATE", "INSERT", "ALTER", "DROP", "CREATE", "RENAME", "TRUNCATE",
];

/// Refused like [`FORBIDDEN`] but not listed in the system instruction.
const REFUSED: &[&str] = &["ATTACH", "DETACH"];

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Semicolon,
}

/// Statement guard that admits single `SELECT`/`WITH` statements only.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementGuard;

impl StatementGuard {
    /// Checks a query, returning [`ExecutionError::Rejected`] with a
    /// human-readable reason the model can act on.
    pub fn check(self, sql: &str) -> Result<(), ExecutionError> {
        let tokens = tokenize(sql);

        let Some(Token::Word(first)) = tokens.first() else {
            return Err(reject("empty statement"));
        };
        if !ALLOWED_LEADING.contains(&first.as_str()) {
            return Err(reject(&format!(
                "only SELECT statements are allowed, got {first}"
            )));
        }

        let mut after_semicolon = false;
        for token in &tokens {
            match token {
                Token::Semicolon => after_semicolon = true,
                Token::Word(word) => {
                    if after_semicolon {
                        return Err(reject("multiple statements are not allowed"));
                    }
                    if FORBIDDEN.contains(&word.as_str()) || REFUSED.contains(&word.as_str()) {
                        return Err(reject(&format!("{word} is forbidden")));
                    }
                }
            }
        }
        Ok(())
    }
}

fn reject(reason: &str) -> ExecutionError {
    ExecutionError::Rejected {
        reason: reason.to_string(),
    }
}

/// Splits SQL into uppercase bare words and semicolons.
fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => skip_quoted(&mut chars, c),
            '[' => skip_quoted(&mut chars, ']'),
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            ';' => tokens.push(Token::Semicolon),
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word.to_uppercase()));
            }
            _ => {}
        }
    }
    tokens
}

/// Consumes up to the closing quote; a doubled quote is an escape.
fn skip_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, close: char) {
    while let Some(n) = chars.next() {
        if n == close {
            if chars.peek() == Some(&close) {
                chars.next();
            } else {
                return;
            }
        }
    }
}
