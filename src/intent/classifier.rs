//! Model-backed intent classifier

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::fallback::{guess, normalize};
use super::{Action, ClassificationResult, ClassificationSource};
use crate::models::json::{parse_object, Recovery};
use crate::models::ModelClient;

/// Ceiling for a verdict recovered by scanning raw text
const KEYWORD_SCAN_CONFIDENCE: f32 = 0.7;
/// Confidence assumed when the model omits it
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.8;

fn build_prompt(text: &str, matched: &BTreeSet<String>) -> String {
    let keywords = if matched.is_empty() {
        "none".to_string()
    } else {
        matched.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    let message = text.replace('"', "\\\"").replace('\n', " ");

    format!(
        r#"You are the intent checker of a local private data store.
A keyword filter flagged the message below. Decide whether the user really
wants to use the local store, or whether the keywords were incidental.

ACTIONS:
- SAVE: store a new value (email, phone number, date, code, note)
- RETRIEVE: get ONE specific stored item ("what is my email")
- LIST: show several or all stored items ("show all", "which data", plural nouns)
- DELETE: remove stored items
- UPDATE: change a stored item to a new value
- NORMAL: not a store command; the message goes to the chat assistant

RULES:
- "which data" / "what do you have" → LIST
- plural nouns or "all" → LIST, a singular item → RETRIEVE
- save verb together with a concrete value → SAVE
- past-tense stories ("I saved it yesterday") and general questions
  ("what is a database?") → NORMAL with false_positive true

EXAMPLES:
"save my email test@test.com" → {{"action": "SAVE", "confidence": 0.97, "false_positive": false, "reasoning": "save verb with an email"}}
"merke dir Omas Geburtstag 15.03.1950" → {{"action": "SAVE", "confidence": 0.95, "false_positive": false, "reasoning": "remember command with a date"}}
"wie war nochmal meine Telefonnummer?" → {{"action": "RETRIEVE", "confidence": 0.93, "false_positive": false, "reasoning": "asks for one stored item"}}
"zeig alle meine Daten" → {{"action": "LIST", "confidence": 0.96, "false_positive": false, "reasoning": "show all stored data"}}
"muéstrame mis datos" → {{"action": "LIST", "confidence": 0.94, "false_positive": false, "reasoning": "plural data"}}
"olvida mi correo" → {{"action": "DELETE", "confidence": 0.95, "false_positive": false, "reasoning": "forget command"}}
"change my email to new@x.io" → {{"action": "UPDATE", "confidence": 0.92, "false_positive": false, "reasoning": "change to new value"}}
"Ich habe die Daten in der Datenbank gespeichert" → {{"action": "NORMAL", "confidence": 0.92, "false_positive": true, "reasoning": "past-tense story"}}
"Was ist eine lokale Datenbank?" → {{"action": "NORMAL", "confidence": 0.96, "false_positive": true, "reasoning": "general question"}}

Message: "{message}"
Keywords: [{keywords}]
Respond with ONE JSON object only:
{{"action": "SAVE|RETRIEVE|DELETE|LIST|UPDATE|NORMAL", "confidence": 0.0-1.0, "false_positive": true|false, "reasoning": "...", "data": {{}}}}"#
    )
}

/// Map a parsed object to a result; `None` when the action is unknown
fn from_object(map: &Map<String, Value>, source: ClassificationSource) -> Option<ClassificationResult> {
    let action = map.get("action").and_then(Value::as_str).and_then(Action::parse)?;
    let confidence = map
        .get("confidence")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map(|c| c as f32)
        .unwrap_or(DEFAULT_MODEL_CONFIDENCE);
    let reasoning = map
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let false_positive = map
        .get("false_positive")
        .and_then(Value::as_bool)
        .unwrap_or(action == Action::Normal);
    let data = map
        .get("data")
        .or_else(|| map.get("extracted_data"))
        .filter(|v| !v.is_null())
        .cloned();

    Some(
        ClassificationResult::new(action, confidence, source, reasoning)
            .with_false_positive(false_positive)
            .with_data(data),
    )
}

/// Earliest action name appearing as a word in the raw answer
fn scan_for_action(raw: &str) -> Option<Action> {
    let upper = raw.to_ascii_uppercase();
    Action::ALL
        .into_iter()
        .filter_map(|action| {
            upper
                .match_indices(action.as_str())
                .find(|(i, word)| {
                    let before = upper[..*i].chars().next_back();
                    let after = upper[i + word.len()..].chars().next();
                    !before.is_some_and(|c| c.is_ascii_alphanumeric())
                        && !after.is_some_and(|c| c.is_ascii_alphanumeric())
                })
                .map(|(i, _)| (i, action))
        })
        .min_by_key(|(i, _)| *i)
        .map(|(_, action)| action)
}

/// Intent classifier over a [`ModelClient`]
pub struct IntentClassifier {
    model: Arc<dyn ModelClient>,
    model_name: String,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn ModelClient>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    /// Classify a trigger-matched message. Never fails.
    pub async fn classify(&self, text: &str, matched: &BTreeSet<String>) -> ClassificationResult {
        let prompt = build_prompt(text, matched);
        let raw = match self.model.generate(&self.model_name, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, backend = self.model.name(), "Classifier model failed, guessing from keywords");
                return guess(text, matched);
            }
        };

        if let Some((map, recovery)) = parse_object(&raw) {
            let source = match recovery {
                Recovery::Direct => ClassificationSource::Model,
                Recovery::Salvaged => ClassificationSource::Salvage,
            };
            if let Some(result) = from_object(&map, source) {
                tracing::debug!(action = %result.action, confidence = result.confidence, source = source.as_str(), "Classified");
                return normalize(text, result);
            }
        }

        if let Some(action) = scan_for_action(&raw) {
            tracing::debug!(action = %action, "Classifier answer unparseable, recovered action by scan");
            let result = ClassificationResult::new(
                action,
                KEYWORD_SCAN_CONFIDENCE,
                ClassificationSource::KeywordScan,
                "recovered from unparseable model answer",
            );
            return normalize(text, result);
        }

        tracing::warn!(answer_len = raw.len(), "Classifier answer unusable, guessing from keywords");
        guess(text, matched)
    }
}
