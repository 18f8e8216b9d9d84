//! ChatVault error types

use thiserror::Error;

/// Failure of an external model collaborator call.
///
/// Never surfaced to the end user: every variant triggers a deterministic
/// fallback in the classifier or extractor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The call did not finish within its time budget
    #[error("collaborator timed out after {0}s")]
    Timeout(u64),

    /// The collaborator could not be reached or exited unsuccessfully
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The collaborator answered, but nothing usable was in the answer
    #[error("collaborator returned unusable output: {0}")]
    BadOutput(String),
}

/// Reason a synthesized statement was refused by the safety gate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Statement is empty after trimming
    #[error("empty statement")]
    Empty,

    /// Leading verb is not SELECT, INSERT or DELETE
    #[error("only SELECT, INSERT, DELETE allowed, got: {0}")]
    VerbNotAllowed(String),

    /// Statement references a table other than the canonical one
    #[error("statement must only reference '{expected}', found '{found}'")]
    ForeignTable { expected: String, found: String },

    /// Statement references no table at all
    #[error("statement does not reference '{0}'")]
    MissingTable(String),

    /// A second statement follows the first
    #[error("multiple statements not allowed")]
    MultipleStatements,

    /// Schema-altering or engine-control keyword present
    #[error("forbidden operation: {0}")]
    ForbiddenKeyword(String),

    /// SQL comments are not accepted
    #[error("comments not allowed")]
    Comment,

    /// A string literal was opened but never closed
    #[error("unterminated string literal")]
    UnterminatedLiteral,

    /// Placeholder count does not match the bound parameters
    #[error("statement has {placeholders} placeholders but {parameters} parameters")]
    ParameterMismatch { placeholders: usize, parameters: usize },
}

/// Malformed wire request. The display text is sent back verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing \"action\" field")]
    MissingAction,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Empty message")]
    EmptyMessage,

    /// Payload grew past the configured cap before its terminator
    #[error("Request too large (limit {0} bytes)")]
    TooLarge(usize),
}

/// ChatVault error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Per-connection transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed wire request
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Model collaborator failure
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Statement rejected before execution
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Local store failure
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Remote chat service failure
    #[error("Chat error: {0}")]
    Chat(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ChatVault operations
pub type Result<T> = std::result::Result<T, Error>;
