//! Query synthesis and the pre-execution safety gate
//!
//! Every statement that reaches the store is built here from typed payloads,
//! carries its values as bound parameters, and has passed [`SqlValidator`].
//!
//! ```text
//! ExtractedPayload ──► QuerySynthesizer ──► SqlValidator ──► SynthesizedStatement{is_safe}
//!                                               │
//!                                               └── ValidationError (nothing executes)
//! ```

mod synthesizer;
mod validator;

pub use synthesizer::QuerySynthesizer;
pub use validator::SqlValidator;

use serde::Serialize;

/// Statement kinds the store will execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Insert,
    Delete,
}

impl StatementKind {
    /// Parse the leading SQL verb
    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb.to_ascii_uppercase().as_str() {
            "SELECT" => Some(Self::Select),
            "INSERT" => Some(Self::Insert),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Null,
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Integer(value)
    }
}

impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value, ValueRef};
        Ok(match self {
            SqlParam::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlParam::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlParam::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

/// A single parameterized statement ready for the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesizedStatement {
    /// Leading verb
    pub kind: StatementKind,
    /// SQL text with `?` placeholders
    pub text: String,
    /// Values bound to the placeholders, in order
    pub parameters: Vec<SqlParam>,
    /// Set only by the validator
    pub is_safe: bool,
}
