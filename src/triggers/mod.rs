//! Fast trigger filter
//!
//! Cheap keyword scan that decides whether a message is worth the cost of
//! intent classification. Anything that matches nothing goes straight to the
//! remote chat service.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{default_trigger_keywords, TriggerConfig};

/// Outcome of a trigger scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerMatch {
    /// Whether the message should go through classification
    pub should_classify: bool,
    /// Every configured pattern that matched, as written in the table
    pub matched: BTreeSet<String>,
}

/// A compiled trigger pattern
#[derive(Debug, Clone)]
enum Pattern {
    /// Whole-word token
    Word(String),
    /// Token in a script written without spaces
    Substring(String),
    /// Multi-word phrase
    Phrase(String),
    /// Phrase with `{slot}` placeholders
    Wildcard(Regex),
}

#[derive(Debug, Clone)]
struct CompiledTrigger {
    source: String,
    pattern: Pattern,
}

/// Stateless keyword scanner built once from configuration
#[derive(Debug, Clone)]
pub struct TriggerFilter {
    triggers: Vec<CompiledTrigger>,
}

/// Han, Hiragana or Katakana
fn is_unspaced_script(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{309F}'
        | '\u{30A0}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}')
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Compile one table entry, or explain why it was skipped
fn compile(entry: &str) -> Result<Pattern, String> {
    let normalized = normalize(entry);
    if normalized.is_empty() {
        return Err("empty pattern".to_string());
    }

    let opens = normalized.matches('{').count();
    let closes = normalized.matches('}').count();
    if opens != closes {
        return Err("unbalanced braces".to_string());
    }

    if opens > 0 {
        let mut parts = Vec::new();
        let mut literal_parts = 0;
        for token in normalized.split(' ') {
            if token.starts_with('{') && token.ends_with('}') {
                let name = &token[1..token.len() - 1];
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err("malformed slot".to_string());
                }
                parts.push(r"\S+".to_string());
            } else if token.contains(['{', '}']) {
                return Err("slot must be a whole token".to_string());
            } else {
                literal_parts += 1;
                parts.push(regex::escape(token));
            }
        }
        if literal_parts == 0 {
            return Err("wildcard phrase has no literal words".to_string());
        }
        let source = format!(r"(?i)(?:^|[^\w]){}(?:$|[^\w])", parts.join(r"\s+"));
        return Regex::new(&source)
            .map(Pattern::Wildcard)
            .map_err(|e| e.to_string());
    }

    if normalized.contains(' ') {
        Ok(Pattern::Phrase(normalized))
    } else if normalized.chars().any(is_unspaced_script) {
        Ok(Pattern::Substring(normalized))
    } else {
        Ok(Pattern::Word(normalized))
    }
}

impl TriggerFilter {
    /// Build from a language → patterns table.
    ///
    /// Malformed entries are skipped with a warning. If nothing usable
    /// remains the built-in table is used instead.
    pub fn new(table: &BTreeMap<String, Vec<String>>) -> Self {
        let triggers = Self::compile_table(table);
        if !triggers.is_empty() {
            return Self { triggers };
        }
        tracing::warn!("Trigger table is empty, using built-in keywords");
        Self {
            triggers: Self::compile_table(&default_trigger_keywords()),
        }
    }

    pub fn from_config(config: &TriggerConfig) -> Self {
        Self::new(&config.keywords)
    }

    fn compile_table(table: &BTreeMap<String, Vec<String>>) -> Vec<CompiledTrigger> {
        let mut seen = BTreeSet::new();
        let mut triggers = Vec::new();
        for (lang, entries) in table {
            for entry in entries {
                match compile(entry) {
                    Ok(pattern) => {
                        if seen.insert(entry.trim().to_string()) {
                            triggers.push(CompiledTrigger {
                                source: entry.trim().to_string(),
                                pattern,
                            });
                        }
                    }
                    Err(reason) => {
                        tracing::warn!(lang = %lang, pattern = %entry, reason = %reason, "Skipping trigger pattern");
                    }
                }
            }
        }
        triggers
    }

    /// Number of usable patterns
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Scan `text` and collect every matching pattern
    pub fn scan(&self, text: &str) -> TriggerMatch {
        let normalized = normalize(text);
        let tokens = words(&normalized);

        let matched: BTreeSet<String> = self
            .triggers
            .iter()
            .filter(|t| match &t.pattern {
                Pattern::Word(w) => tokens.contains(w),
                Pattern::Substring(s) | Pattern::Phrase(s) => normalized.contains(s.as_str()),
                Pattern::Wildcard(re) => re.is_match(&normalized),
            })
            .map(|t| t.source.clone())
            .collect();

        TriggerMatch {
            should_classify: !matched.is_empty(),
            matched,
        }
    }
}

impl Default for TriggerFilter {
    fn default() -> Self {
        Self::new(&default_trigger_keywords())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[&str]) -> BTreeMap<String, Vec<String>> {
        let mut t = BTreeMap::new();
        t.insert("en".to_string(), entries.iter().map(|s| s.to_string()).collect());
        t
    }

    #[test]
    fn test_no_match_means_no_classification() {
        let filter = TriggerFilter::new(&table(&["save", "delete"]));
        let m = filter.scan("What is the capital of France?");
        assert!(!m.should_classify);
        assert!(m.matched.is_empty());
    }

    #[test]
    fn test_literal_is_whole_word() {
        let filter = TriggerFilter::new(&table(&["save", "db"]));
        assert!(filter.scan("Save my email test@test.com").should_classify);
        assert!(!filter.scan("I saved a lot of money").should_classify);
        assert!(!filter.scan("feedback please").should_classify);
        assert!(filter.scan("put it in the db.").should_classify);
    }

    #[test]
    fn test_collects_all_matches() {
        let filter = TriggerFilter::new(&table(&["save", "email", "my data"]));
        let m = filter.scan("save   my  DATA and email");
        let got: Vec<_> = m.matched.iter().map(String::as_str).collect();
        assert_eq!(got, vec!["email", "my data", "save"]);
    }

    #[test]
    fn test_wildcard_slot() {
        let filter = TriggerFilter::new(&table(&["my {x} is"]));
        assert!(filter.scan("My pin is 4411").should_classify);
        assert!(!filter.scan("my is").should_classify);
        assert!(!filter.scan("my favourite colour is blue").should_classify);
        assert!(filter
            .scan("my favourite is blue")
            .matched
            .contains("my {x} is"));
    }

    #[test]
    fn test_unspaced_scripts_use_substring() {
        let filter = TriggerFilter::new(&table(&["保存"]));
        assert!(filter.scan("メールを保存して").should_classify);
        assert!(filter.scan("请保存我的邮箱").should_classify);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let filter = TriggerFilter::new(&table(&["", "  ", "my {x is", "{x}", "my {} is", "save"]));
        assert_eq!(filter.len(), 1);
        assert!(filter.scan("save this").should_classify);
    }

    #[test]
    fn test_empty_table_uses_defaults() {
        let filter = TriggerFilter::new(&BTreeMap::new());
        assert!(!filter.is_empty());
        assert!(filter.scan("list all data").matched.contains("list"));

        let all_bad = TriggerFilter::new(&table(&["{x}"]));
        assert!(all_bad.scan("delete my email").should_classify);
    }

    #[test]
    fn test_default_table_multilingual() {
        let filter = TriggerFilter::default();
        assert!(filter.scan("Speichere meine E-Mail max@web.de").should_classify);
        assert!(filter.scan("muéstrame mis datos").should_classify);
        assert!(filter.scan("mein Passwort ist hunter2").matched.contains("mein {x} ist"));
        assert!(!filter.scan("Tell me a joke about cats").should_classify);
    }
}
