//! Deterministic extraction rules
//!
//! Value-shaped patterns plus a small multilingual lexicon of stopwords and
//! command verbs. Used whenever the extraction model is unavailable or
//! produces something implausible, and by the intent guesser.

use regex::Regex;
use std::sync::OnceLock;

use super::payload::{DeleteTarget, ListFilter, RetrieveQuery, SaveData, UpdateSpec, ValueKind};

pub(crate) const SAVE_VERBS: &[&str] = &[
    "save", "store", "remember", "keep", "note", "record", "add", "speichere", "speichern",
    "speicher", "merke", "merk", "merken", "notiere", "behalte", "guarda", "guardar", "recuerda",
    "anota", "sauvegarde", "enregistre", "souviens", "garde", "salva", "salvare", "ricorda",
    "annota", "salvar", "lembra", "lembrar", "anotar",
];

pub(crate) const RETRIEVE_VERBS: &[&str] = &[
    "show", "get", "retrieve", "fetch", "find", "give", "display", "tell", "load", "hole", "hol",
    "zeig", "zeige", "gib", "finde", "muestra", "muéstrame", "dame", "busca", "obtén", "affiche",
    "montre", "donne", "trouve", "mostra", "mostrami", "dammi", "trova", "mostrar", "buscar",
    "pegar",
];

pub(crate) const DELETE_VERBS: &[&str] = &[
    "delete", "remove", "forget", "erase", "clear", "lösche", "löschen", "vergiss", "entferne",
    "elimina", "borra", "olvida", "supprime", "efface", "oublie", "cancella", "dimentica",
    "rimuovi", "apaga", "apagar", "esquece", "esquecer", "remover", "deleta",
];

pub(crate) const LIST_VERBS: &[&str] = &[
    "list", "liste", "lista", "listar", "elenca", "lister", "auflisten", "enumerate",
];

pub(crate) const UPDATE_VERBS: &[&str] = &[
    "update", "change", "modify", "edit", "replace", "ändere", "ändern", "aktualisiere",
    "actualiza", "cambia", "modifica", "modifie", "aggiorna", "atualiza", "atualizar", "altera",
    "muda",
];

pub(crate) const ALL_WORDS: &[&str] = &[
    "all", "everything", "alle", "alles", "todo", "todos", "todas", "tout", "tous", "toutes",
    "tutto", "tutti", "tudo",
];

/// Generic nouns that name the store itself rather than an item in it
pub(crate) const DATA_NOUNS: &[&str] = &[
    "data", "daten", "datos", "données", "dati", "dados", "entries", "records", "info", "infos",
    "information", "informationen", "stuff", "things", "items", "saved", "stored",
    "gespeichert", "gespeicherten", "guardados", "enregistré", "salvati", "salvos",
];

const STOPWORDS: &[&str] = &[
    // en
    "my", "mine", "me", "the", "a", "an", "of", "for", "to", "in", "on", "from", "please",
    "what", "what's", "whats", "is", "are", "was", "which", "your", "you", "i", "it", "this",
    "that", "and", "about", "do", "have", "has", "know", "can", "could", "would", "local",
    "locally", "db", "database", "again", "now", "as",
    // de
    "mein", "meine", "meinen", "meiner", "meines", "mir", "mich", "dir", "die", "der", "das",
    "den", "dem", "ein", "eine", "von", "aus", "im", "bitte", "was", "wie", "ist", "welche",
    "hast", "du", "und", "zu", "auf", "lokal", "lokalen", "datenbank", "nochmal", "war",
    // es
    "mi", "mis", "el", "la", "los", "las", "de", "del", "un", "una", "por", "favor", "qué",
    "que", "cuál", "es", "en", "y", "base", "datos",
    // fr
    "mon", "ma", "mes", "le", "les", "du", "des", "une", "moi", "et", "quel", "quelle", "est",
    // it
    "il", "lo", "mio", "mia", "miei", "mie", "di", "per", "è", "e",
    // pt
    "meu", "minha", "meus", "minhas", "o", "os", "as", "do", "da", "um", "uma", "é",
];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)\b(?:https?://|www\.)[^\s<>]+[^\s<>.,;:!?)]")
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"\b(?:\d{4}-\d{1,2}-\d{1,2}|\d{1,2}[./\-]\d{1,2}[./\-]\d{2,4}|\d{1,2}\.?\s+\p{L}{3,}\.?\s+\d{4})\b",
    )
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?:\+\d|\b\d)[\d\s\-/()]{5,}\d\b")
}

fn my_x_is_y_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)\b(?:my|mein|meine|mi|mon|ma|il mio|la mia|meu|minha)\s+(.+?)\s+(?:is|ist|es|est|è|é)\s+(.+)$",
    )
}

fn update_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)^\s*\S+\s+(.+?)\s+(?:to|into|with|zu|auf|in|mit|a|en|à|por|para)\s+(.+?)\s*$",
    )
}

/// A value-shaped span found in the text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueMatch {
    pub kind: ValueKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// All value-shaped spans, non-overlapping, in text order.
///
/// Earlier pattern families win overlaps: email, URL, date, phone, then
/// single-token codes and numbers.
pub fn find_values(text: &str) -> Vec<ValueMatch> {
    let mut found: Vec<ValueMatch> = Vec::new();
    let overlaps = |found: &[ValueMatch], s: usize, e: usize| {
        found.iter().any(|m| s < m.end && m.start < e)
    };

    let families = [
        (email_re(), ValueKind::Email),
        (url_re(), ValueKind::Url),
        (date_re(), ValueKind::Date),
        (phone_re(), ValueKind::Phone),
    ];
    for (re, kind) in families {
        for m in re.find_iter(text) {
            if !overlaps(&found, m.start(), m.end()) {
                found.push(ValueMatch {
                    kind,
                    text: m.as_str().trim().to_string(),
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
    }

    let mut offset = 0;
    for raw in text.split_inclusive(char::is_whitespace) {
        let start = offset;
        offset += raw.len();
        let token = trim_token(raw);
        if token.is_empty() {
            continue;
        }
        let Some(kind) = token_kind(token) else {
            continue;
        };
        let lead = raw.find(token).unwrap_or(0);
        let (s, e) = (start + lead, start + lead + token.len());
        if !overlaps(&found, s, e) {
            found.push(ValueMatch {
                kind,
                text: token.to_string(),
                start: s,
                end: e,
            });
        }
    }

    found.sort_by_key(|m| m.start);
    found
}

/// Digits-only or mixed letter/digit tokens
fn token_kind(token: &str) -> Option<ValueKind> {
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    if !has_digit {
        return None;
    }
    let numeric = token
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == ',');
    if numeric {
        return Some(ValueKind::Number);
    }
    let code_like = token.chars().count() >= 4
        && token.chars().any(|c| c.is_alphabetic())
        && token
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '#' | '/'));
    code_like.then_some(ValueKind::Code)
}

/// First value-shaped span
pub fn first_value(text: &str) -> Option<ValueMatch> {
    find_values(text).into_iter().next()
}

/// Classify a value string as a whole
pub fn classify_value(value: &str) -> ValueKind {
    match find_values(value).as_slice() {
        [only] if only.text == value.trim() => only.kind,
        _ => ValueKind::Text,
    }
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '?' | '!' | '.' | ',' | ';' | ':' | '"' | '(' | ')' | '¿' | '¡')
    })
}

fn in_list(list: &[&str], word: &str) -> bool {
    let lower = word.to_lowercase();
    list.contains(&lower.as_str())
}

pub(crate) fn is_command_word(word: &str) -> bool {
    [SAVE_VERBS, RETRIEVE_VERBS, DELETE_VERBS, LIST_VERBS, UPDATE_VERBS]
        .iter()
        .any(|list| in_list(list, word))
}

pub(crate) fn is_stopword(word: &str) -> bool {
    in_list(STOPWORDS, word)
}

/// Lowercased tokens with edge punctuation trimmed
pub(crate) fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(trim_token)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Whether any token is one of `words`
pub(crate) fn has_any(text: &str, words: &[&str]) -> bool {
    tokens(text).iter().any(|t| words.contains(&t.as_str()))
}

/// Content words of `text`: verbs, stopwords and sentinels removed,
/// original casing kept.
pub fn content_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(trim_token)
        .filter(|t| !t.is_empty())
        .filter(|t| !is_command_word(t) && !is_stopword(t) && !in_list(ALL_WORDS, t))
        .map(|t| t.to_string())
        .collect()
}

/// Whether the text asks for everything
pub fn mentions_all(text: &str) -> bool {
    has_any(text, ALL_WORDS)
}

const LANGUAGE_MARKERS: [(&str, &[&str]); 5] = [
    (
        "de",
        &[
            "mein", "meine", "ich", "ist", "und", "nicht", "bitte", "speichere", "merke", "zeig",
            "zeige", "lösche", "vergiss", "daten", "welche", "wie",
        ],
    ),
    (
        "es",
        &[
            "mi", "mis", "el", "los", "por", "guarda", "recuerda", "muestra", "muéstrame", "olvida",
            "borra", "datos", "qué", "cuál",
        ],
    ),
    (
        "fr",
        &[
            "mon", "ma", "mes", "est", "le", "les", "sauvegarde", "affiche", "oublie", "supprime",
            "données", "quel", "quelle",
        ],
    ),
    (
        "it",
        &["il", "mio", "mia", "miei", "è", "salva", "ricorda", "mostrami", "dimentica", "dati"],
    ),
    (
        "pt",
        &[
            "meu", "minha", "meus", "é", "salvar", "lembra", "mostrar", "esquece", "apaga",
            "dados",
        ],
    ),
];

/// Best-effort language code for the `lang` column; "en" when unsure
pub fn detect_language(text: &str) -> &'static str {
    if text
        .chars()
        .any(|c| matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}'))
    {
        return "ja";
    }
    if text.chars().any(|c| matches!(c, '\u{4E00}'..='\u{9FFF}')) {
        return "zh";
    }

    let words = tokens(text);
    LANGUAGE_MARKERS
        .iter()
        .map(|(lang, markers)| {
            let hits = words.iter().filter(|w| markers.contains(&w.as_str())).count();
            (*lang, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        .fold(None, |best: Option<(&'static str, usize)>, (lang, hits)| match best {
            Some((_, top)) if top >= hits => best,
            _ => Some((lang, hits)),
        })
        .map(|(lang, _)| lang)
        .unwrap_or("en")
}

/// Drop a trailing plural `s` from longer words ("emails" → "email")
fn singular(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.chars().count() > 4 && lower.ends_with('s') && !lower.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn trim_value(value: &str) -> &str {
    value.trim().trim_end_matches(['.', '!', '?', ',', ';'])
}

/// "my X is Y" in any supported language
pub fn implicit_save(text: &str) -> Option<(String, String)> {
    let caps = my_x_is_y_re().captures(text.trim())?;
    let label = caps.get(1)?.as_str().trim();
    let value = trim_value(caps.get(2)?.as_str());
    if label.is_empty() || value.is_empty() {
        return None;
    }
    Some((label.to_string(), value.to_string()))
}

/// Rule-based SAVE: label (multi-word kept) plus the literal value
pub fn save_rule(text: &str) -> Option<SaveData> {
    if let Some(value) = first_value(text) {
        let before = &text[..value.start];
        let after = &text[value.end..];
        let mut label_words = content_words(before);
        if label_words.is_empty() {
            label_words = content_words(after);
        }
        let label = label_words.join(" ");
        return SaveData::new(
            (!label.is_empty()).then_some(label.as_str()),
            &value.text,
            value.kind,
        );
    }

    if let Some((label, value)) = implicit_save(text) {
        let label = content_words(&label).join(" ");
        return SaveData::new(
            (!label.is_empty()).then_some(label.as_str()),
            &value,
            classify_value(&value),
        );
    }

    let rest = content_words(text).join(" ");
    SaveData::new(None, &rest, ValueKind::Text)
}

/// Rule-based RETRIEVE keywords
pub fn retrieve_rule(text: &str) -> Option<RetrieveQuery> {
    let words: Vec<String> = content_words(text)
        .into_iter()
        .filter(|w| !in_list(DATA_NOUNS, w))
        .collect();
    RetrieveQuery::new(words.iter().map(|w| singular(w)))
}

/// Rule-based DELETE target.
///
/// An exact value wins over a label. With several values only the first is
/// used.
pub fn delete_rule(text: &str) -> Option<DeleteTarget> {
    let values = find_values(text);
    if let Some(first) = values.first() {
        if values.len() > 1 {
            let ignored: Vec<&str> = values[1..].iter().map(|v| v.text.as_str()).collect();
            tracing::info!(kept = %first.text, ignored = ?ignored, "Several values in delete request, using the first");
        }
        return DeleteTarget::value(&first.text);
    }

    let words: Vec<String> = content_words(text)
        .into_iter()
        .filter(|w| !in_list(DATA_NOUNS, w))
        .collect();
    if words.is_empty() {
        return mentions_all(text).then_some(DeleteTarget::All);
    }
    let label = words.iter().map(|w| singular(w)).collect::<Vec<_>>().join(" ");
    DeleteTarget::label(&label)
}

/// Rule-based LIST filter
pub fn list_rule(text: &str) -> ListFilter {
    let words: Vec<String> = content_words(text)
        .into_iter()
        .filter(|w| !in_list(DATA_NOUNS, w))
        .collect();
    if words.is_empty() {
        return ListFilter::All;
    }
    let keyword = words.iter().map(|w| singular(w)).collect::<Vec<_>>().join(" ");
    ListFilter::keyword(&keyword)
}

/// Rule-based UPDATE parts, either of which may be missing
pub fn update_parts(text: &str) -> (Option<String>, Option<String>) {
    if let Some(caps) = update_shape_re().captures(text) {
        let target = caps
            .get(1)
            .map(|m| content_words(m.as_str()).join(" "))
            .filter(|t| !t.is_empty());
        let new_value = caps
            .get(2)
            .map(|m| trim_value(m.as_str()).to_string())
            .filter(|v| !v.is_empty());
        if target.is_some() {
            return (target, new_value);
        }
    }

    match first_value(text) {
        Some(value) => {
            let target = content_words(&text[..value.start]).join(" ");
            ((!target.is_empty()).then_some(target), Some(value.text))
        }
        None => {
            let target = content_words(text).join(" ");
            ((!target.is_empty()).then_some(target), None)
        }
    }
}

/// Rule-based UPDATE; `None` when either part is missing
pub fn update_rule(text: &str) -> Option<UpdateSpec> {
    let (target, new_value) = update_parts(text);
    UpdateSpec::new(target.as_deref(), new_value.as_deref())
}
