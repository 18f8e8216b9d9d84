//! Statement safety gate
//!
//! Rejects anything that is not a single SELECT / INSERT / DELETE against the
//! canonical table. Runs on every statement before execution, including the
//! ones this crate builds itself.

use super::{SqlParam, StatementKind, SynthesizedStatement};
use crate::error::ValidationError;
use regex::Regex;
use std::sync::OnceLock;

/// Keywords that alter schema or control the engine
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "ALTER", "CREATE", "PRAGMA", "ATTACH", "DETACH", "VACUUM", "REINDEX", "TRUNCATE",
    "RENAME",
];

/// Keywords whose next identifier names a table
const TABLE_INTRODUCERS: &[&str] = &["FROM", "INTO", "JOIN", "TABLE", "UPDATE"];

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("static regex"))
}

/// Statement text with literals blanked out, plus what the scan counted
struct Scanned {
    code: String,
    placeholders: usize,
}

/// Validator bound to one canonical table name
#[derive(Debug, Clone)]
pub struct SqlValidator {
    table: String,
}

impl SqlValidator {
    /// Create a validator for `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Canonical table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Validate `text` with `parameter_count` bound values, returning the
    /// statement kind on success.
    pub fn validate(
        &self,
        text: &str,
        parameter_count: usize,
    ) -> Result<StatementKind, ValidationError> {
        let trimmed = text.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let scanned = scan(trimmed)?;
        let words: Vec<regex::Match<'_>> = word_regex().find_iter(&scanned.code).collect();

        let verb = words
            .first()
            .map(|m| m.as_str().to_ascii_uppercase())
            .ok_or(ValidationError::Empty)?;
        let kind = StatementKind::from_verb(&verb)
            .ok_or_else(|| ValidationError::VerbNotAllowed(verb.clone()))?;

        for word in &words {
            let upper = word.as_str().to_ascii_uppercase();
            if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                return Err(ValidationError::ForbiddenKeyword(upper));
            }
            if upper.starts_with("SQLITE_") {
                return Err(self.foreign(word.as_str()));
            }
        }

        let mut referenced = false;
        for (i, word) in words.iter().enumerate() {
            let upper = word.as_str().to_ascii_uppercase();
            if !TABLE_INTRODUCERS.contains(&upper.as_str()) {
                continue;
            }
            let next = words.get(i + 1);
            // upsert clause: ON CONFLICT(...) DO UPDATE SET
            if upper == "UPDATE"
                && next.is_some_and(|n| n.as_str().eq_ignore_ascii_case("SET"))
            {
                continue;
            }
            let Some(table) = next else {
                return Err(ValidationError::MissingTable(self.table.clone()));
            };
            if !table.as_str().eq_ignore_ascii_case(&self.table) {
                return Err(self.foreign(table.as_str()));
            }
            // comma join: FROM mydata, other
            if scanned.code[table.end()..].trim_start().starts_with(',') && upper == "FROM" {
                let other = words
                    .get(i + 2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| ",".to_string());
                return Err(self.foreign(&other));
            }
            referenced = true;
        }

        if !referenced {
            return Err(ValidationError::MissingTable(self.table.clone()));
        }

        if scanned.placeholders != parameter_count {
            return Err(ValidationError::ParameterMismatch {
                placeholders: scanned.placeholders,
                parameters: parameter_count,
            });
        }

        Ok(kind)
    }

    /// Validate and seal a statement
    pub fn seal(
        &self,
        text: String,
        parameters: Vec<SqlParam>,
    ) -> Result<SynthesizedStatement, ValidationError> {
        match self.validate(&text, parameters.len()) {
            Ok(kind) => Ok(SynthesizedStatement {
                kind,
                text,
                parameters,
                is_safe: true,
            }),
            Err(e) => {
                tracing::warn!(error = %e, statement = %text, "Statement rejected by safety gate");
                Err(e)
            }
        }
    }

    fn foreign(&self, found: &str) -> ValidationError {
        ValidationError::ForeignTable {
            expected: self.table.clone(),
            found: found.to_string(),
        }
    }
}

/// Blank out string literals, unwrap quoted identifiers, and reject comments
/// and statement separators outside literals.
fn scan(text: &str) -> Result<Scanned, ValidationError> {
    let mut code = String::with_capacity(text.len());
    let mut placeholders = 0;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                // '' inside a literal is an escaped quote
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == '\'' {
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                            continue;
                        }
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(ValidationError::UnterminatedLiteral);
                }
                code.push_str("''");
            }
            '"' | '`' | '[' => {
                let close = match c {
                    '[' => ']',
                    other => other,
                };
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == close {
                        closed = true;
                        break;
                    }
                    code.push(inner);
                }
                if !closed {
                    return Err(ValidationError::UnterminatedLiteral);
                }
            }
            '-' if chars.peek() == Some(&'-') => return Err(ValidationError::Comment),
            '/' if chars.peek() == Some(&'*') => return Err(ValidationError::Comment),
            ';' => return Err(ValidationError::MultipleStatements),
            '?' => {
                placeholders += 1;
                code.push(c);
                // ?NNN numbered placeholders
                while chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                    chars.next();
                }
            }
            _ => code.push(c),
        }
    }

    Ok(Scanned { code, placeholders })
}
