//! Model-assisted data extraction with rule fallback

use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::payload::{
    DeleteTarget, ExtractedPayload, Extraction, ListFilter, RetrieveQuery, SaveData, UpdateSpec,
};
use super::rules;
use crate::intent::Action;
use crate::models::{json::strip_code_fences, ModelClient};

/// Longest plausible SAVE answer
const MAX_SAVE_ANSWER: usize = 100;
/// Longest plausible answer for every other action
const MAX_PHRASE_ANSWER: usize = 30;

fn bracket_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]").expect("static regex"))
}

const PREAMBLE_PREFIXES: &[&str] = &[
    "here is", "here's", "sure", "okay", "ok,", "the extracted", "output", "answer", "result",
];

/// Reduce a raw model answer to the single line that carries the data
fn clean_answer(raw: &str) -> String {
    let without_fences = strip_code_fences(raw);
    let without_tags = bracket_tag_re().replace_all(&without_fences, "");

    let line = without_tags
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|l| {
            let lower = l.to_lowercase();
            let is_preamble = PREAMBLE_PREFIXES.iter().any(|p| lower.starts_with(p))
                && (lower.ends_with(':') || !lower.contains(": "));
            !is_preamble
        })
        .unwrap_or_default();

    let line = line
        .strip_prefix("Extract:")
        .or_else(|| line.strip_prefix("extract:"))
        .unwrap_or(line);
    line.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn save_prompt(text: &str) -> String {
    format!(
        r#"Extract data in format "description: value". Copy the value exactly as written.

User said: save my email address test@example.com
Extract: email address: test@example.com

User said: remember my phone number 234324987
Extract: phone number: 234324987

User said: save my sisters birthday 02 July 1998
Extract: sisters birthday: 02 July 1998

User said: speichere meine Email Adresse test@test.de
Extract: Email Adresse: test@test.de

User said: merke Omas Geburtstag 15.03.1950
Extract: Omas Geburtstag: 15.03.1950

User said: guarda mi correo test@ejemplo.es
Extract: correo: test@ejemplo.es

User said: {text}
Extract: "#
    )
}

fn phrase_prompt(verb: &str, text: &str) -> String {
    format!(
        r#"Extract what the user wants to {verb}. Keep the FULL phrase, nothing else.

User said: {verb} my email address
Extract: email address

User said: {verb} my sisters birthday
Extract: sisters birthday

User said: zeig meine Email Adresse
Extract: Email Adresse

User said: vergiss Omas Geburtstag
Extract: Omas Geburtstag

User said: borra mi dirección de correo
Extract: dirección de correo

User said: {text}
Extract: "#
    )
}

fn list_prompt(text: &str) -> String {
    format!(
        r#"Extract what type of data the user wants to list. Return "*" for everything.

User said: show all my email addresses
Extract: email address

User said: list my phone numbers
Extract: phone number

User said: show all my data
Extract: *

User said: zeig alle meine Daten
Extract: *

User said: lista todo
Extract: *

User said: {text}
Extract: "#
    )
}

fn update_prompt(text: &str) -> String {
    format!(
        r#"Extract what to change and the new value in format "target -> new value".
Write "?" for a part the user did not give.

User said: change my email to new@example.com
Extract: email -> new@example.com

User said: ändere meine Telefonnummer auf 030123456
Extract: Telefonnummer -> 030123456

User said: update my address
Extract: address -> ?

User said: {text}
Extract: "#
    )
}

/// Per-action extractor.
///
/// Every operation first asks the extraction model and falls back to
/// [`rules`] when the answer is missing or implausible.
pub struct DataExtractor {
    model: Arc<dyn ModelClient>,
    model_name: String,
}

impl DataExtractor {
    pub fn new(model: Arc<dyn ModelClient>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    /// Ask the model, returning a cleaned answer no longer than `max_len`
    async fn ask(&self, prompt: &str, max_len: usize, action: Action) -> Option<String> {
        match self.model.generate(&self.model_name, prompt).await {
            Ok(raw) => {
                let answer = clean_answer(&raw);
                if answer.is_empty() {
                    tracing::debug!(action = %action, "Extraction model gave an empty answer");
                    None
                } else if answer.chars().count() > max_len {
                    tracing::debug!(action = %action, len = answer.len(), "Extraction answer implausibly long");
                    None
                } else {
                    Some(answer)
                }
            }
            Err(e) => {
                tracing::warn!(action = %action, error = %e, backend = self.model.name(), "Extraction model failed, using rules");
                None
            }
        }
    }

    /// SAVE: `label: value`, value must occur in the input
    pub async fn extract_save(&self, text: &str) -> Option<Extraction<SaveData>> {
        if let Some(answer) = self.ask(&save_prompt(text), MAX_SAVE_ANSWER, Action::Save).await {
            let (label, value) = match answer.split_once(": ") {
                Some((label, value)) => (Some(label), value),
                None => (None, answer.as_str()),
            };
            let value = value.trim();
            if !value.is_empty() && contains_ignore_case(text, value) {
                if let Some(data) = SaveData::new(label, value, rules::classify_value(value)) {
                    return Some(Extraction::model(data));
                }
            } else {
                tracing::debug!(value = %value, "Extracted value not present in input, using rules");
            }
        }
        rules::save_rule(text).map(Extraction::rule)
    }

    /// RETRIEVE: the full phrase, split into content keywords
    pub async fn extract_retrieve(&self, text: &str) -> Option<Extraction<RetrieveQuery>> {
        let prompt = phrase_prompt("show", text);
        if let Some(answer) = self.ask(&prompt, MAX_PHRASE_ANSWER, Action::Retrieve).await {
            let words = rules::content_words(&answer);
            let query = if words.is_empty() {
                RetrieveQuery::new([answer.as_str()])
            } else {
                RetrieveQuery::new(&words)
            };
            if let Some(query) = query {
                return Some(Extraction::model(query));
            }
        }
        rules::retrieve_rule(text).map(Extraction::rule)
    }

    /// DELETE: an exact value in the input always wins over a label phrase
    pub async fn extract_delete(&self, text: &str) -> Option<Extraction<DeleteTarget>> {
        if rules::first_value(text).is_some() {
            return rules::delete_rule(text).map(Extraction::rule);
        }
        let prompt = phrase_prompt("delete", text);
        if let Some(answer) = self.ask(&prompt, MAX_PHRASE_ANSWER, Action::Delete).await {
            let target = if answer == "*" || rules::content_words(&answer).is_empty() {
                rules::mentions_all(text).then_some(DeleteTarget::All)
            } else {
                DeleteTarget::label(&answer)
            };
            if let Some(target) = target {
                return Some(Extraction::model(target));
            }
        }
        rules::delete_rule(text).map(Extraction::rule)
    }

    /// LIST: a filter phrase, or everything
    pub async fn extract_list(&self, text: &str) -> Extraction<ListFilter> {
        if let Some(answer) = self.ask(&list_prompt(text), MAX_PHRASE_ANSWER, Action::List).await {
            // same stopword and plural handling as the rule path
            return Extraction::model(rules::list_rule(&answer));
        }
        Extraction::rule(rules::list_rule(text))
    }

    /// UPDATE: `target -> new value`; `None` when either part is missing
    pub async fn extract_update(&self, text: &str) -> Option<Extraction<UpdateSpec>> {
        if let Some(answer) = self.ask(&update_prompt(text), MAX_PHRASE_ANSWER * 2, Action::Update).await {
            if let Some((target, new_value)) = answer.split_once("->") {
                let new_value = new_value.trim();
                let new_value = (new_value != "?" && contains_ignore_case(text, new_value))
                    .then_some(new_value);
                if let Some(spec) = UpdateSpec::new(Some(target.trim()), new_value) {
                    return Some(Extraction::model(spec));
                }
            }
        }
        rules::update_rule(text).map(Extraction::rule)
    }

    /// Dispatch on `action`. `None` for NORMAL or when nothing usable was
    /// found.
    pub async fn extract(&self, action: Action, text: &str) -> Option<Extraction<ExtractedPayload>> {
        match action {
            Action::Save => self
                .extract_save(text)
                .await
                .map(|e| e.map(ExtractedPayload::Save)),
            Action::Retrieve => self
                .extract_retrieve(text)
                .await
                .map(|e| e.map(ExtractedPayload::Retrieve)),
            Action::Delete => self
                .extract_delete(text)
                .await
                .map(|e| e.map(ExtractedPayload::Delete)),
            Action::List => Some(self.extract_list(text).await.map(ExtractedPayload::List)),
            Action::Update => self
                .extract_update(text)
                .await
                .map(|e| e.map(ExtractedPayload::Update)),
            Action::Normal => None,
        }
    }
}
