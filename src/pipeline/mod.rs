//! Intent-routing pipeline
//!
//! ```text
//! message ─► pending DELETE? ──yes──► confirm / cancel
//!               │no
//!               ▼
//!          trigger filter ──no match──► remote chat
//!               │match
//!               ▼
//!          classifier ──NORMAL / false positive──► remote chat
//!               │local action
//!               ▼
//!          handler (extract ─► synthesize ─► store)
//! ```
//!
//! One pipeline is built per process and shared by every connection.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::chat::{ChatBackend, ChatOutcome, ChatService, OpenAiChat};
use crate::config::ChatVaultConfig;
use crate::error::{Error, Result};
use crate::extract::{rules, DataExtractor};
use crate::handlers::{
    handler_for, resolve_confirmation, ActionOutcome, HandlerDeps, MessageCatalog, Request,
};
use crate::intent::{ClassificationResult, IntentClassifier};
use crate::models::{self, ModelClient};
use crate::query::QuerySynthesizer;
use crate::session::SessionManager;
use crate::store::{LocalStore, CANONICAL_TABLE};
use crate::triggers::TriggerFilter;

/// Answer to one user message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: Value,
}

impl Reply {
    fn local(outcome: ActionOutcome, classification: Option<&ClassificationResult>) -> Self {
        let mut metadata = serde_json::to_value(&outcome.metadata).unwrap_or_else(|_| json!({}));
        if let (Some(c), Some(map)) = (classification, metadata.as_object_mut()) {
            map.insert(
                "classification".to_string(),
                serde_json::to_value(c).unwrap_or(Value::Null),
            );
        }
        let success = outcome.is_success();
        Self {
            success,
            response: success.then(|| outcome.message.clone()),
            error: (!success).then_some(outcome.message),
            metadata,
        }
    }

    fn remote(result: Result<ChatOutcome>, classification: Option<&ClassificationResult>) -> Self {
        let classification = classification
            .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        match result {
            Ok(outcome) => {
                let mut metadata = serde_json::to_value(&outcome).unwrap_or_else(|_| json!({}));
                if let Some(map) = metadata.as_object_mut() {
                    map.remove("response");
                    map.insert("source".to_string(), json!("remote"));
                    map.insert("classification".to_string(), classification);
                }
                Self {
                    success: true,
                    response: Some(outcome.response),
                    error: None,
                    metadata,
                }
            }
            Err(e) => Self {
                success: false,
                response: None,
                error: Some(e.to_string()),
                metadata: json!({ "source": "remote", "classification": classification }),
            },
        }
    }
}

/// Everything needed to route and answer a message
pub struct Pipeline {
    triggers: TriggerFilter,
    classifier: IntentClassifier,
    deps: HandlerDeps,
    sessions: SessionManager,
    chat: ChatService,
}

impl Pipeline {
    /// Build the pipeline with the configured collaborators
    pub fn from_config(config: &ChatVaultConfig) -> Result<Self> {
        let key = match &config.storage.encryption_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                Error::Config(format!("Encryption key variable {} is not set", var))
            })?),
            None => None,
        };
        let store = Arc::new(LocalStore::open(&config.storage.db_path, key.as_deref())?);
        let model = models::build_client(&config.models);
        let chat: Arc<dyn ChatBackend> = Arc::new(OpenAiChat::new(&config.chat));
        tracing::info!(
            db = %config.storage.db_path.display(),
            model_backend = model.name(),
            chat_backend = chat.name(),
            "Pipeline ready"
        );
        Ok(Self::with_components(config, model, chat, store))
    }

    /// Build the pipeline around explicit collaborators
    pub fn with_components(
        config: &ChatVaultConfig,
        model: Arc<dyn ModelClient>,
        chat: Arc<dyn ChatBackend>,
        store: Arc<LocalStore>,
    ) -> Self {
        Self {
            triggers: TriggerFilter::from_config(&config.triggers),
            classifier: IntentClassifier::new(
                Arc::clone(&model),
                config.models.classifier_model.clone(),
            ),
            deps: HandlerDeps {
                extractor: DataExtractor::new(model, config.models.extractor_model.clone()),
                synthesizer: QuerySynthesizer::new(CANONICAL_TABLE),
                store: Arc::clone(&store),
                messages: MessageCatalog::new(config.messages.clone()),
            },
            sessions: SessionManager::new(),
            chat: ChatService::new(chat, store, config.chat.context_window),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.deps.store
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Route one message and answer it
    pub async fn process(
        &self,
        session_id: &str,
        message: &str,
        system_prompt: Option<&str>,
    ) -> Reply {
        self.sessions.touch(session_id).await;

        if let Some(pending) = self.sessions.take_pending(session_id).await {
            tracing::debug!(session_id = session_id, "Resolving pending delete");
            let outcome = resolve_confirmation(&self.deps, pending, Some(message)).await;
            return Reply::local(outcome, None);
        }

        let scan = self.triggers.scan(message);
        if !scan.should_classify {
            tracing::debug!(session_id = session_id, "No trigger matched, forwarding");
            return Reply::remote(
                self.chat.respond(session_id, message, system_prompt).await,
                None,
            );
        }

        let classification = self.classifier.classify(message, &scan.matched).await;
        tracing::info!(
            session_id = session_id,
            action = %classification.action,
            confidence = classification.confidence,
            source = classification.source.as_str(),
            false_positive = classification.false_positive,
            "Message classified"
        );

        let handler = match handler_for(classification.action) {
            Some(handler) if !classification.false_positive => handler,
            _ => {
                return Reply::remote(
                    self.chat.respond(session_id, message, system_prompt).await,
                    Some(&classification),
                );
            }
        };

        let request = Request {
            session_id,
            text: message,
            classification: &classification,
            language: rules::detect_language(message),
        };
        let mut outcome = handler.handle(&self.deps, &request).await;
        if let Some(pending) = outcome.pending.take() {
            self.sessions.set_pending(session_id, pending).await;
        }
        Reply::local(outcome, Some(&classification))
    }

    /// Delete the remote-chat history of every session and drop all
    /// session contexts, returning the number of deleted turns.
    pub async fn cleanup_history(&self) -> Result<usize> {
        let store = Arc::clone(&self.deps.store);
        let deleted = tokio::task::spawn_blocking(move || store.clear_history())
            .await
            .map_err(|e| Error::Internal(format!("Cleanup task failed: {}", e)))??;
        let sessions = self.sessions.clear().await;
        tracing::info!(deleted, sessions, "Chat history cleaned");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::RecordingChat;
    use crate::error::CollaboratorError;
    use crate::models::ScriptedModel;

    struct Harness {
        pipeline: Pipeline,
        chat: Arc<RecordingChat>,
    }

    fn harness(model: ScriptedModel) -> Harness {
        let chat = Arc::new(RecordingChat::new());
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let pipeline = Pipeline::with_components(
            &ChatVaultConfig::default(),
            Arc::new(model),
            Arc::clone(&chat) as Arc<dyn ChatBackend>,
            store,
        );
        Harness { pipeline, chat }
    }

    fn text(reply: &Reply) -> &str {
        reply
            .response
            .as_deref()
            .or(reply.error.as_deref())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_no_trigger_goes_to_remote_chat() {
        let h = harness(ScriptedModel::new());
        let reply = h.pipeline.process("s", "tell a joke about cats", None).await;
        let reply2 = h.pipeline.process("s", "hello there", None).await;

        assert!(reply2.success);
        assert_eq!(reply2.response.as_deref(), Some("echo: hello there"));
        assert_eq!(reply2.metadata["source"], "remote");
        assert!(reply.success);
        assert_eq!(h.pipeline.store().item_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scenario_save_then_retrieve() {
        let h = harness(
            ScriptedModel::new()
                .answer(r#"{"action": "SAVE", "confidence": 0.97, "false_positive": false, "reasoning": "save verb with email"}"#)
                .answer("email: test@test.com")
                .answer(r#"{"action": "RETRIEVE", "confidence": 0.93, "false_positive": false, "reasoning": "asks for email"}"#)
                .answer("email"),
        );

        let saved = h.pipeline.process("s", "save my email test@test.com", None).await;
        assert!(saved.success, "{:?}", saved);
        assert_eq!(saved.metadata["source"], "local");
        assert_eq!(saved.metadata["action"], "SAVE");
        assert_eq!(saved.metadata["method"], "model");
        assert_eq!(h.pipeline.store().item_count().unwrap(), 1);

        let found = h.pipeline.process("s", "show my email", None).await;
        assert!(found.success);
        assert_eq!(found.metadata["action"], "RETRIEVE");
        assert!(text(&found).contains("test@test.com"));
        assert!(h.chat.requests().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_delete_cancelled() {
        let h = harness(ScriptedModel::new());
        h.pipeline.process("s", "save my email test@test.com", None).await;

        let asked = h.pipeline.process("s", "delete my email", None).await;
        assert!(asked.success);
        assert_eq!(asked.metadata["status"], "awaiting_confirmation");
        assert!(h.pipeline.sessions().has_pending("s").await);

        let answer = h.pipeline.process("s", "no", None).await;
        assert!(answer.success);
        assert_eq!(answer.metadata["status"], "cancelled");
        assert_eq!(text(&answer), "❌ Delete cancelled");
        assert_eq!(h.pipeline.store().item_count().unwrap(), 1);
        assert!(!h.pipeline.sessions().has_pending("s").await);
    }

    #[tokio::test]
    async fn test_delete_confirmed_only_in_same_session() {
        let h = harness(ScriptedModel::new());
        h.pipeline.process("a", "save my email test@test.com", None).await;
        h.pipeline.process("a", "delete my email", None).await;

        // another session's "yes" is just chat
        let other = h.pipeline.process("b", "yes", None).await;
        assert_eq!(other.metadata["source"], "remote");
        assert_eq!(h.pipeline.store().item_count().unwrap(), 1);

        let done = h.pipeline.process("a", "yes", None).await;
        assert_eq!(done.metadata["status"], "deleted");
        assert_eq!(done.metadata["affected_rows"], 1);
        assert_eq!(h.pipeline.store().item_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scenario_list_after_classifier_timeout() {
        let h = harness(ScriptedModel::new());
        for text in ["save my email a@b.io", "save my pin 4242"] {
            h.pipeline.process("s", text, None).await;
        }

        let h2 = Harness {
            pipeline: Pipeline::with_components(
                &ChatVaultConfig::default(),
                Arc::new(ScriptedModel::new().fail(CollaboratorError::Timeout(15))),
                Arc::clone(&h.chat) as Arc<dyn ChatBackend>,
                Arc::clone(h.pipeline.store()),
            ),
            chat: Arc::clone(&h.chat),
        };
        let listed = h2.pipeline.process("s", "list all data", None).await;
        assert!(listed.success);
        assert_eq!(listed.metadata["action"], "LIST");
        assert_eq!(listed.metadata["classification"]["source"], "fallback");
        let confidence = listed.metadata["classification"]["confidence"].as_f64().unwrap();
        assert!(confidence <= 0.6 + 1e-6);
        assert_eq!(listed.metadata["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_false_positive_is_forwarded() {
        let h = harness(ScriptedModel::new());
        let reply = h
            .pipeline
            .process("s", "I saved the file to the database yesterday", None)
            .await;
        assert_eq!(reply.metadata["source"], "remote");
        assert_eq!(reply.metadata["classification"]["action"], "NORMAL");
        assert_eq!(h.chat.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_update_is_an_error_reply() {
        let h = harness(ScriptedModel::new());
        let reply = h.pipeline.process("s", "update my email", None).await;
        assert!(!reply.success);
        assert_eq!(reply.metadata["status"], "insufficient");
        assert!(reply.error.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_history() {
        let h = harness(ScriptedModel::new());
        h.pipeline.process("s", "hello there", None).await;
        h.pipeline.process("t", "how are you", None).await;
        assert_eq!(h.pipeline.cleanup_history().await.unwrap(), 4);
        assert!(h.pipeline.sessions().is_empty().await);
        assert!(h.pipeline.store().history("s", 10).unwrap().is_empty());
    }
}
