//! Local store
//!
//! One embedded SQLite file holding the user's private items (`mydata`) and
//! the remote-chat conversation history (`chat_history`).

mod sqlite;

pub use sqlite::{LocalStore, StoreOutcome, CANONICAL_TABLE};

use serde::{Deserialize, Serialize};

/// A single private item saved by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    /// Store-assigned identifier
    pub id: i64,
    /// The literal payload (email, number, date, ...)
    pub content: String,
    /// Semantic tag such as "email" or "Omas Geburtstag"
    pub label: Option<String>,
    /// Language the item was saved in
    pub language: String,
    /// Last save time, unix millis
    pub created_at: i64,
}

impl StoredItem {
    /// `label: content`, or just the content when unlabelled
    pub fn display(&self) -> String {
        match &self.label {
            Some(label) => format!("{}: {}", label, self.content),
            None => self.content.clone(),
        }
    }
}

/// One message of a remote-chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Session the turn belongs to
    pub session_id: String,
    /// "user" or "assistant"
    pub role: String,
    /// Message text
    pub content: String,
    /// Unix millis
    pub timestamp: i64,
}
