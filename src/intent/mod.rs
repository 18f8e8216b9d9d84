//! Intent classification
//!
//! Decides whether a trigger-matched message really is a local data command
//! and which one. The model answer is trusted only as far as it parses; a
//! deterministic guesser covers everything else.
//!
//! ```text
//! model answer ─► outermost {…} ─► salvaged {…} ─► keyword scan (≤0.7)
//!      │                                                 │
//!      └── timeout / unavailable ─────────────► guesser (≤0.6, default NORMAL)
//! ```

mod classifier;
mod fallback;

pub use classifier::IntentClassifier;
pub use fallback::{guess, normalize};

use serde::Serialize;
use std::fmt;

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Save,
    Retrieve,
    Delete,
    List,
    Update,
    /// Not a local data command; forwarded to the remote chat service
    Normal,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Save,
        Action::Retrieve,
        Action::Delete,
        Action::List,
        Action::Update,
        Action::Normal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Save => "SAVE",
            Action::Retrieve => "RETRIEVE",
            Action::Delete => "DELETE",
            Action::List => "LIST",
            Action::Update => "UPDATE",
            Action::Normal => "NORMAL",
        }
    }

    /// Case-insensitive parse of an action name
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|a| a.as_str() == upper)
    }

    /// Whether this action touches the local store
    pub fn is_local(&self) -> bool {
        !matches!(self, Action::Normal)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rung of the recovery ladder produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Model,
    Salvage,
    KeywordScan,
    Fallback,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Model => "model",
            ClassificationSource::Salvage => "salvage",
            ClassificationSource::KeywordScan => "keyword_scan",
            ClassificationSource::Fallback => "fallback",
        }
    }
}

/// Classifier verdict; every field is always populated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub action: Action,
    /// Always within `[0, 1]`
    pub confidence: f32,
    /// The trigger match was incidental
    pub false_positive: bool,
    /// Whatever structured data the model volunteered
    pub extracted_data: Option<serde_json::Value>,
    pub reasoning: String,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    pub fn new(
        action: Action,
        confidence: f32,
        source: ClassificationSource,
        reasoning: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.5
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            action,
            confidence,
            false_positive: action == Action::Normal,
            extracted_data: None,
            reasoning: reasoning.into(),
            source,
        }
    }

    pub fn with_false_positive(mut self, false_positive: bool) -> Self {
        self.false_positive = false_positive;
        self
    }

    pub fn with_data(mut self, data: Option<serde_json::Value>) -> Self {
        self.extracted_data = data;
        self
    }
}
