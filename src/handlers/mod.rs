//! Action handlers
//!
//! One handler per local action. Every handler follows the same steps:
//! extract, synthesize, execute, then turn the store result into an
//! [`ActionOutcome`]. Errors never escape a handler; validation and store
//! failures become a localized failure message.

mod delete;
mod list;
mod messages;
mod retrieve;
mod save;
mod update;

pub use delete::{is_affirmative, resolve_confirmation, DeleteHandler};
pub use list::ListHandler;
pub use messages::{MessageCatalog, MessageKey};
pub use retrieve::RetrieveHandler;
pub use save::SaveHandler;
pub use update::UpdateHandler;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::extract::{DataExtractor, ExtractionMethod};
use crate::intent::{Action, ClassificationResult};
use crate::query::QuerySynthesizer;
use crate::session::DeleteConfirmation;
use crate::store::{LocalStore, StoredItem};

/// How a local action ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Saved,
    Found,
    /// Nothing matched; still a success
    Empty,
    Deleted,
    /// Negative or missing confirmation; neutral
    Cancelled,
    Updated,
    /// The message lacked what the action needs
    Insufficient,
    NotFound,
    /// The safety gate refused the statement
    Rejected,
    /// The store failed
    Failed,
    AwaitingConfirmation,
}

impl OutcomeStatus {
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            OutcomeStatus::Insufficient
                | OutcomeStatus::NotFound
                | OutcomeStatus::Rejected
                | OutcomeStatus::Failed
        )
    }
}

/// Metadata attached to every local response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeMetadata {
    /// Always "local"
    pub source: &'static str,
    pub action: Action,
    pub status: OutcomeStatus,
    pub confidence: f32,
    /// How the payload was extracted, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ExtractionMethod>,
    pub affected_rows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<StoredItem>,
}

/// Result of a local action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    pub metadata: OutcomeMetadata,
    /// Set only by a DELETE preview; the caller parks it in the session
    pub pending: Option<DeleteConfirmation>,
}

impl ActionOutcome {
    pub fn new(
        action: Action,
        confidence: f32,
        status: OutcomeStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            metadata: OutcomeMetadata {
                source: "local",
                action,
                status,
                confidence,
                method: None,
                affected_rows: 0,
                items: Vec::new(),
            },
            pending: None,
        }
    }

    pub fn with_method(mut self, method: ExtractionMethod) -> Self {
        self.metadata.method = Some(method);
        self
    }

    pub fn with_items(mut self, items: Vec<StoredItem>) -> Self {
        self.metadata.items = items;
        self
    }

    pub fn with_affected(mut self, rows: usize) -> Self {
        self.metadata.affected_rows = rows;
        self
    }

    pub fn with_pending(mut self, pending: DeleteConfirmation) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Collaborators shared by all handlers
pub struct HandlerDeps {
    pub extractor: DataExtractor,
    pub synthesizer: QuerySynthesizer,
    pub store: Arc<LocalStore>,
    pub messages: MessageCatalog,
}

/// One classified message
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub session_id: &'a str,
    pub text: &'a str,
    pub classification: &'a ClassificationResult,
    /// Language code stored alongside saved items
    pub language: &'static str,
}

impl Request<'_> {
    /// Outcome skeleton for this request
    pub fn outcome(&self, status: OutcomeStatus, message: impl Into<String>) -> ActionOutcome {
        ActionOutcome::new(
            self.classification.action,
            self.classification.confidence,
            status,
            message,
        )
    }
}

/// Shared handler interface
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Action served by this handler
    fn action(&self) -> Action;

    /// Run the action; errors are turned into outcomes by [`handle`](Self::handle)
    async fn execute(&self, deps: &HandlerDeps, request: &Request<'_>) -> Result<ActionOutcome>;

    /// Run the action, never failing
    async fn handle(&self, deps: &HandlerDeps, request: &Request<'_>) -> ActionOutcome {
        match self.execute(deps, request).await {
            Ok(outcome) => {
                tracing::info!(
                    action = %self.action(),
                    status = ?outcome.status,
                    affected = outcome.metadata.affected_rows,
                    "Local action handled"
                );
                outcome
            }
            Err(e) => failure(deps, request, e),
        }
    }
}

/// Map an error to a localized failure outcome
fn failure(deps: &HandlerDeps, request: &Request<'_>, error: Error) -> ActionOutcome {
    match error {
        Error::Validation(e) => {
            tracing::error!(action = %request.classification.action, error = %e, "Statement rejected by safety gate");
            request.outcome(OutcomeStatus::Rejected, deps.messages.get(MessageKey::Rejected))
        }
        e => {
            tracing::error!(action = %request.classification.action, error = %e, "Local action failed");
            request.outcome(OutcomeStatus::Failed, deps.messages.get(MessageKey::Failed))
        }
    }
}

/// Handler for a local action; `None` for NORMAL, which is forwarded to the
/// remote chat service instead.
pub fn handler_for(action: Action) -> Option<&'static dyn ActionHandler> {
    match action {
        Action::Save => Some(&SaveHandler),
        Action::Retrieve => Some(&RetrieveHandler),
        Action::Delete => Some(&DeleteHandler),
        Action::List => Some(&ListHandler),
        Action::Update => Some(&UpdateHandler),
        Action::Normal => None,
    }
}

/// Current time in unix millis
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One item per line, for list and confirmation messages
pub(crate) fn bullet_list(items: &[StoredItem]) -> String {
    items
        .iter()
        .map(|item| format!("• {}", item.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::intent::ClassificationSource;
    use crate::models::ScriptedModel;
    use crate::store::CANONICAL_TABLE;

    /// Handler deps over an in-memory store and a scripted extraction model
    pub fn deps(model: ScriptedModel) -> HandlerDeps {
        deps_with_store(model, Arc::new(LocalStore::open_in_memory().unwrap()))
    }

    /// Handler deps over an existing store
    pub fn deps_with_store(model: ScriptedModel, store: Arc<LocalStore>) -> HandlerDeps {
        HandlerDeps {
            extractor: DataExtractor::new(Arc::new(model), "llama3.2:3b"),
            synthesizer: QuerySynthesizer::new(CANONICAL_TABLE),
            store,
            messages: MessageCatalog::default(),
        }
    }

    pub fn classified(action: Action) -> ClassificationResult {
        ClassificationResult::new(action, 0.9, ClassificationSource::Model, "test")
    }

    pub fn request<'a>(text: &'a str, classification: &'a ClassificationResult) -> Request<'a> {
        Request {
            session_id: "test",
            text,
            classification,
            language: "en",
        }
    }
}
