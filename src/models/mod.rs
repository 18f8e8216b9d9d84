//! Local model collaborator
//!
//! Narrow, timeout-bounded access to the local model runner. The classifier
//! and the extractor only ever see [`ModelClient`]; every failure comes back
//! as a [`CollaboratorError`] and is recovered by the caller.
//!
//! ```text
//! IntentClassifier ─┐
//!                   ├─► Arc<dyn ModelClient> ─► OllamaCli  (`ollama run`)
//! DataExtractor  ───┘                        └► OllamaHttp (`/api/generate`)
//! ```

mod cli;
mod http;
pub mod json;

pub use cli::OllamaCli;
pub use http::OllamaHttp;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{ModelBackend, ModelsConfig};
use crate::error::CollaboratorError;

/// Text-in, text-out access to a local model
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run `prompt` against `model` and return the raw answer
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, CollaboratorError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Build the configured backend.
///
/// With `rules_only` set, a [`DisabledModel`] is returned so every caller
/// goes straight to its deterministic path.
pub fn build_client(config: &ModelsConfig) -> Arc<dyn ModelClient> {
    if config.rules_only {
        return Arc::new(DisabledModel);
    }
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.backend {
        ModelBackend::Cli => Arc::new(OllamaCli::new(&config.runner_command, timeout)),
        ModelBackend::Http => Arc::new(OllamaHttp::new(&config.base_url, timeout)),
    }
}

/// Backend that never answers
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledModel;

#[async_trait]
impl ModelClient for DisabledModel {
    async fn generate(&self, _model: &str, _prompt: &str) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Unavailable("model calls disabled".to_string()))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// In-process model double that replays canned answers in order.
///
/// Once the script is exhausted every call fails with `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful answer
    pub fn answer(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    /// Queue a failure
    pub fn fail(self, error: CollaboratorError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, item: Result<String, CollaboratorError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, _model: &str, prompt: &str) -> Result<String, CollaboratorError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.script
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("script lock poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::Unavailable("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
