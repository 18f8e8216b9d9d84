//! Deterministic intent rules
//!
//! The same precedence is used for guessing when the model is unavailable
//! and for correcting what the model answered.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::{Action, ClassificationResult, ClassificationSource};
use crate::extract::rules::{
    self, has_any, DATA_NOUNS, DELETE_VERBS, LIST_VERBS, RETRIEVE_VERBS, SAVE_VERBS, UPDATE_VERBS,
};

/// Highest confidence the guesser ever reports
pub const GUESS_CONFIDENCE: f32 = 0.6;

fn narration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:i|we|he|she|they)\s+(?:have\s+|had\s+|already\s+|just\s+)?(?:saved|stored|deleted|removed|remembered|updated|changed|listed)\b|\b(?:ich|wir|er|sie)\s+(?:habe|haben|hat|hatte|hatten)\b.*\b(?:gespeichert|gelöscht|notiert|gemerkt)\b|\b(?:he|hemos|ha|han)\s+(?:guardado|borrado|eliminado)\b|\b(?:yesterday|gestern|ayer)\b|\b(?:j'ai|j’ai|nous\s+avons|on\s+a|il\s+a|elle\s+a)\s[^.?!]*\bhier\b|\bhier\s+(?:soir|matin)\b",
        )
        .expect("static regex")
    })
}

/// Definition questions; these name something the user owns when a
/// possessive follows ("what are my phone numbers")
fn definition_question_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:what\s+is\s+(?:a|an|the)\b|what's\s+(?:a|an|the)\b|what\s+are\b|was\s+ist\s+(?:ein|eine|der|die|das)\b|¿?qué\s+es\s+(?:un|una|el|la)\b|qu'est-ce\b|cos'è\b|o\s+que\s+é\b)",
        )
        .expect("static regex")
    })
}

fn explain_question_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:how\s+(?:do|does|can|to)\b|why\b|explain\b|tell\s+me\s+about\b|can\s+you\s+explain\b|wie\s+funktioniert\b|erkläre?\b|kannst\s+du\s+(?:mir\s+)?(?:was\s+)?über\b)",
        )
        .expect("static regex")
    })
}

fn possessive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:my|mine|mein|meine|meinen|meiner|mi|mis|mon|ma|mes|mio|mia|miei|mie|meu|minha|meus|minhas)\b",
        )
        .expect("static regex")
    })
}

fn my_items_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bwhat\s+are\s+my\b|\bwelche\s+sind\s+meine\b|\bwie\s+lauten\s+meine\b|\bcuáles\s+son\s+mis\b|\bquels\s+sont\s+mes\b|\bquali\s+sono\s+i\s+miei\b|\bquais\s+são\s+os\s+meus\b",
        )
        .expect("static regex")
    })
}

fn which_data_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:which|what)\s+(?:data|info|information|entries|records|things)\b|\bwhat\s+(?:do|did)\s+you\s+(?:have|know|store|remember)\b|\bwhat\s+have\s+you\s+(?:saved|stored)\b|\bwelche\s+(?:daten|infos|informationen|einträge)\b|\bwas\s+hast\s+du\b|\bqué\s+datos\b|\bquelles?\s+(?:données|informations)\b|\bquali\s+dati\b|\bquais\s+dados\b",
        )
        .expect("static regex")
    })
}

fn what_is_my_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:\bwhat\s+is|\bwhat's|\bwhats|\bwie\s+ist|\bwie\s+war|\bcuál\s+es|\bquel\s+est|\bqual\s+è|\bqual\s+é)\s+(?:my|mein|meine|mi|mon|ma|il\s+mio|la\s+mia|meu|minha)\b",
        )
        .expect("static regex")
    })
}

/// Past-tense narration or a general-knowledge question
pub(crate) fn incidental(text: &str) -> Option<&'static str> {
    if narration_re().is_match(text) {
        Some("past-tense narration, not a command")
    } else if explain_question_re().is_match(text)
        || (definition_question_re().is_match(text) && !possessive_re().is_match(text))
    {
        Some("general-knowledge question")
    } else {
        None
    }
}

pub(crate) fn asks_which_data(text: &str) -> bool {
    which_data_re().is_match(text)
}

/// "what are my ..." style questions about several owned items
pub(crate) fn asks_my_items(text: &str) -> bool {
    my_items_re().is_match(text)
}

pub(crate) fn asks_single_item(text: &str) -> bool {
    what_is_my_re().is_match(text)
}

/// "all", a generic data noun, or a plural item noun
pub(crate) fn asks_plural(text: &str) -> bool {
    if rules::mentions_all(text) || has_any(text, DATA_NOUNS) {
        return true;
    }
    rules::content_words(text).iter().any(|w| {
        let lower = w.to_lowercase();
        lower.chars().count() > 4
            && lower.ends_with('s')
            && !lower.ends_with("ss")
            && lower.chars().all(char::is_alphabetic)
    })
}

fn has_value(text: &str) -> bool {
    rules::first_value(text).is_some() || rules::implicit_save(text).is_some()
}

fn verdict(action: Action, confidence: f32, reasoning: &str) -> ClassificationResult {
    ClassificationResult::new(action, confidence, ClassificationSource::Fallback, reasoning)
}

/// Keyword guess used when the model gave nothing usable
pub fn guess(text: &str, matched: &BTreeSet<String>) -> ClassificationResult {
    if matched.is_empty() {
        return verdict(Action::Normal, 0.5, "no trigger keywords matched");
    }
    if let Some(reason) = incidental(text) {
        return verdict(Action::Normal, GUESS_CONFIDENCE, reason);
    }
    if asks_which_data(text) {
        return verdict(Action::List, GUESS_CONFIDENCE, "asks which data is stored");
    }
    if asks_my_items(text) && asks_plural(text) {
        return verdict(Action::List, GUESS_CONFIDENCE, "asks for several owned items");
    }

    let value = has_value(text);
    if has_any(text, SAVE_VERBS) && value {
        return verdict(Action::Save, GUESS_CONFIDENCE, "save verb with a value");
    }
    if has_any(text, DELETE_VERBS) {
        return verdict(Action::Delete, GUESS_CONFIDENCE, "delete verb");
    }
    if has_any(text, UPDATE_VERBS) {
        return verdict(Action::Update, 0.55, "update verb");
    }
    if has_any(text, LIST_VERBS) {
        return verdict(Action::List, GUESS_CONFIDENCE, "list verb");
    }
    if has_any(text, RETRIEVE_VERBS) || asks_single_item(text) {
        if asks_plural(text) && !asks_single_item(text) {
            return verdict(Action::List, GUESS_CONFIDENCE, "show verb with plural object");
        }
        return verdict(Action::Retrieve, GUESS_CONFIDENCE, "show verb with singular object");
    }
    if value && rules::implicit_save(text).is_some() {
        return verdict(Action::Save, 0.55, "\"my X is Y\" statement");
    }
    if has_any(text, SAVE_VERBS) {
        return verdict(Action::Save, 0.5, "save verb without a value");
    }

    verdict(Action::Normal, 0.5, "no command pattern recognised")
}

/// Correct a model verdict with the deterministic precedence
pub fn normalize(text: &str, result: ClassificationResult) -> ClassificationResult {
    let rewrite = |result: ClassificationResult, action: Action, why: &str| {
        tracing::debug!(from = %result.action, to = %action, reason = why, "Normalized classification");
        let reasoning = format!("{} (normalized: {})", result.reasoning, why);
        ClassificationResult {
            action,
            false_positive: action == Action::Normal,
            reasoning,
            ..result
        }
    };

    if result.action.is_local() {
        if let Some(reason) = incidental(text) {
            return rewrite(result, Action::Normal, reason);
        }
    }

    match result.action {
        Action::Retrieve | Action::Normal if asks_which_data(text) && incidental(text).is_none() => {
            rewrite(result, Action::List, "asks which data is stored")
        }
        Action::Retrieve | Action::Normal
            if asks_my_items(text) && asks_plural(text) && incidental(text).is_none() =>
        {
            rewrite(result, Action::List, "asks for several owned items")
        }
        Action::Retrieve if asks_plural(text) && !asks_single_item(text) => {
            rewrite(result, Action::List, "plural object")
        }
        Action::List
            if asks_single_item(text) && !rules::mentions_all(text) && !asks_plural(text) =>
        {
            rewrite(result, Action::Retrieve, "singular object")
        }
        _ => result,
    }
}
