//! Remote chat collaborator
//!
//! Messages that are not local data commands go to an OpenAI-compatible
//! chat service. The conversation of each session is kept in the local
//! store and replayed as context, bounded by `context_window` exchanges.

mod openai;

pub use openai::OpenAiChat;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::store::{ChatTurn, LocalStore};

/// One message sent to the chat service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Reply from the chat service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    /// Token usage as reported by the service
    pub total_tokens: Option<u32>,
}

/// Chat completion backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatReply>;

    fn name(&self) -> &str;
}

/// Reply plus the context that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOutcome {
    pub response: String,
    pub model: String,
    /// Earlier turns sent as context
    pub history_turns: usize,
    /// Rough size of the request, four characters per token
    pub estimated_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// Chat backend plus per-session history
pub struct ChatService {
    backend: Arc<dyn ChatBackend>,
    store: Arc<LocalStore>,
    context_window: usize,
}

impl ChatService {
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<LocalStore>, context_window: usize) -> Self {
        Self {
            backend,
            store,
            context_window,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Send `message` with the session's recent history and record both
    /// sides of the exchange.
    pub async fn respond(
        &self,
        session_id: &str,
        message: &str,
        system_prompt: Option<&str>,
    ) -> Result<ChatOutcome> {
        let history = {
            let store = Arc::clone(&self.store);
            let session = session_id.to_string();
            let limit = self.context_window * 2;
            tokio::task::spawn_blocking(move || store.history(&session, limit))
                .await
                .map_err(|e| Error::Internal(format!("History task failed: {}", e)))??
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(history.iter().map(|turn| ChatMessage {
            role: turn.role.clone(),
            content: turn.content.clone(),
        }));
        messages.push(ChatMessage::user(message));

        let estimated_tokens = messages.iter().map(|m| m.content.chars().count()).sum::<usize>() / 4;
        tracing::debug!(
            session_id = session_id,
            history = history.len(),
            estimated_tokens,
            backend = self.backend.name(),
            "Forwarding to remote chat"
        );

        let reply = self.backend.complete(&messages).await?;
        self.record(session_id, message, &reply.content).await?;

        Ok(ChatOutcome {
            response: reply.content,
            model: reply.model,
            history_turns: history.len(),
            estimated_tokens,
            total_tokens: reply.total_tokens,
        })
    }

    async fn record(&self, session_id: &str, question: &str, answer: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let turns = [("user", question), ("assistant", answer)].map(|(role, content)| ChatTurn {
            session_id: session_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            timestamp: now,
        });
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || turns.iter().try_for_each(|t| store.append_turn(t)))
            .await
            .map_err(|e| Error::Internal(format!("History task failed: {}", e)))?
    }
}

/// In-process chat double that records what it was sent
#[derive(Debug, Default)]
pub struct RecordingChat {
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    fail: bool,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// A double whose every call fails
    pub fn failing() -> Self {
        Self {
            requests: Mutex::default(),
            fail: true,
        }
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatBackend for RecordingChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatReply> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        if self.fail {
            return Err(Error::Chat("chat service unavailable".to_string()));
        }
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(ChatReply {
            content: format!("echo: {}", last),
            model: "recording".to_string(),
            total_tokens: None,
        })
    }

    fn name(&self) -> &str {
        "recording"
    }
}
