//! Typed payloads handed from the extractor to the synthesizer

use serde::Serialize;

/// Shape of a saved value, as recognised by the value patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Email,
    Url,
    Phone,
    Date,
    Number,
    Code,
    Text,
}

/// How an extraction was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Parsed from the extraction model's answer
    Model,
    /// Deterministic pattern rules
    Rule,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Model => "model",
            ExtractionMethod::Rule => "rule",
        }
    }
}

/// An extracted value together with how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<T> {
    pub value: T,
    pub method: ExtractionMethod,
}

impl<T> Extraction<T> {
    pub fn model(value: T) -> Self {
        Self {
            value,
            method: ExtractionMethod::Model,
        }
    }

    pub fn rule(value: T) -> Self {
        Self {
            value,
            method: ExtractionMethod::Rule,
        }
    }

    /// Transform the value, keeping the method
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extraction<U> {
        Extraction {
            value: f(self.value),
            method: self.method,
        }
    }
}

fn clean(s: &str) -> Option<String> {
    let trimmed = s.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// What to save: a literal value and an optional label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveData {
    label: Option<String>,
    value: String,
    kind: ValueKind,
}

impl SaveData {
    /// Returns `None` when the value is blank
    pub fn new(label: Option<&str>, value: &str, kind: ValueKind) -> Option<Self> {
        Some(Self {
            value: clean(value)?,
            label: label.and_then(clean),
            kind,
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

/// Content keywords for a RETRIEVE, OR-matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrieveQuery {
    keywords: Vec<String>,
}

impl RetrieveQuery {
    /// Returns `None` when no non-blank keyword remains
    pub fn new<I, S>(keywords: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for k in keywords {
            if let Some(k) = clean(k.as_ref()) {
                if !out.iter().any(|existing| existing.eq_ignore_ascii_case(&k)) {
                    out.push(k);
                }
            }
        }
        (!out.is_empty()).then_some(Self { keywords: out })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

/// What a DELETE removes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", content = "term", rename_all = "snake_case")]
pub enum DeleteTarget {
    /// Rows whose content equals the value exactly
    Value(String),
    /// Rows whose label contains the text
    Label(String),
    /// Every row
    All,
}

impl DeleteTarget {
    pub fn value(value: &str) -> Option<Self> {
        clean(value).map(Self::Value)
    }

    pub fn label(label: &str) -> Option<Self> {
        clean(label).map(Self::Label)
    }
}

/// What a LIST shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", content = "term", rename_all = "snake_case")]
pub enum ListFilter {
    /// Rows whose content or label contains the keyword
    Keyword(String),
    /// Everything
    All,
}

impl ListFilter {
    /// Blank or `*` filters mean everything
    pub fn keyword(keyword: &str) -> Self {
        match clean(keyword) {
            Some(k) if k != "*" => Self::Keyword(k),
            _ => Self::All,
        }
    }
}

/// Which item to change and its replacement value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateSpec {
    target: String,
    new_value: String,
}

impl UpdateSpec {
    /// Returns `None` unless both parts are present
    pub fn new(target: Option<&str>, new_value: Option<&str>) -> Option<Self> {
        Some(Self {
            target: clean(target?)?,
            new_value: clean(new_value?)?,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn new_value(&self) -> &str {
        &self.new_value
    }
}

/// Tagged union of everything the extractor can produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractedPayload {
    Save(SaveData),
    Retrieve(RetrieveQuery),
    Delete(DeleteTarget),
    List(ListFilter),
    Update(UpdateSpec),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_data_requires_value() {
        assert!(SaveData::new(Some("email"), "  ", ValueKind::Text).is_none());
        let data = SaveData::new(Some(" email "), "'a@b.io'", ValueKind::Email).unwrap();
        assert_eq!(data.label(), Some("email"));
        assert_eq!(data.value(), "a@b.io");
        assert!(SaveData::new(Some(""), "x", ValueKind::Text)
            .unwrap()
            .label()
            .is_none());
    }

    #[test]
    fn test_retrieve_query_dedups_and_rejects_empty() {
        assert!(RetrieveQuery::new(Vec::<String>::new()).is_none());
        assert!(RetrieveQuery::new([" ", ""]).is_none());
        let q = RetrieveQuery::new(["email", "Email", "phone"]).unwrap();
        assert_eq!(q.keywords(), &["email".to_string(), "phone".to_string()]);
    }

    #[test]
    fn test_list_filter_sentinel() {
        assert_eq!(ListFilter::keyword("*"), ListFilter::All);
        assert_eq!(ListFilter::keyword(""), ListFilter::All);
        assert_eq!(
            ListFilter::keyword("email"),
            ListFilter::Keyword("email".to_string())
        );
    }

    #[test]
    fn test_update_spec_needs_both_parts() {
        assert!(UpdateSpec::new(Some("email"), None).is_none());
        assert!(UpdateSpec::new(None, Some("x@y.z")).is_none());
        assert!(UpdateSpec::new(Some("email"), Some(" ")).is_none());
        let spec = UpdateSpec::new(Some("email"), Some("x@y.z")).unwrap();
        assert_eq!(spec.target(), "email");
        assert_eq!(spec.new_value(), "x@y.z");
    }

    #[test]
    fn test_payload_serializes_tagged() {
        let payload = ExtractedPayload::Delete(DeleteTarget::Label("email".to_string()));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["action"], "DELETE");
        assert_eq!(json["by"], "label");
        assert_eq!(json["term"], "email");
    }
}
