//! Recovering a JSON object from free-form model output
//!
//! Small models wrap their JSON in prose or code fences and sometimes stop
//! mid-object. [`parse_object`] tries, in order: the outermost `{...}` as
//! is, then a salvaged prefix that ends on the last complete field with all
//! open brackets re-closed.

use serde_json::{Map, Value};

/// How an object was recovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The outermost object parsed as is
    Direct,
    /// Parsed only after truncation and re-closing
    Salvaged,
}

/// Drop ```` ``` ```` fence lines, keeping what was inside
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Slice from the first `{` to its matching `}`, or to the end of the text
/// when the object was never closed.
pub fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    Some(&text[start..])
}

/// Candidate repairs of a truncated object, best first
fn repairs(fragment: &str) -> Vec<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    // (byte offset before the separator, closers needed at that point)
    let mut last_field: Option<(usize, Vec<char>)> = None;

    for (i, c) in fragment.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            ',' => last_field = Some((i, stack.clone())),
            _ => {}
        }
    }

    let close = |mut s: String, closers: &[char]| {
        s.extend(closers.iter().rev());
        s
    };

    let mut out = Vec::new();
    if !escaped {
        let mut whole = fragment.trim_end().to_string();
        if in_string {
            whole.push('"');
        }
        let whole = whole.trim_end_matches([',', ':']).to_string();
        out.push(close(whole, &stack));
    }
    if let Some((end, closers)) = last_field {
        out.push(close(fragment[..end].to_string(), &closers));
    }
    out
}

fn as_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Find and parse one JSON object in `text`
pub fn parse_object(text: &str) -> Option<(Map<String, Value>, Recovery)> {
    let cleaned = strip_code_fences(text);
    let fragment = outermost_object(&cleaned)?;

    if let Some(map) = serde_json::from_str(fragment).ok().and_then(as_object) {
        return Some((map, Recovery::Direct));
    }

    repairs(fragment).into_iter().find_map(|candidate| {
        serde_json::from_str(&candidate)
            .ok()
            .and_then(as_object)
            .map(|map| (map, Recovery::Salvaged))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_inside_prose_and_fences() {
        let text = "Sure! Here is the result:\n```json\n{\"action\": \"SAVE\", \"confidence\": 0.9}\n```\nHope that helps.";
        let (map, how) = parse_object(text).unwrap();
        assert_eq!(how, Recovery::Direct);
        assert_eq!(map["action"], "SAVE");
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"action": "NORMAL", "reasoning": "user typed } and {"} trailing"#;
        let (map, how) = parse_object(text).unwrap();
        assert_eq!(how, Recovery::Direct);
        assert_eq!(map["reasoning"], "user typed } and {");
    }

    #[test]
    fn test_salvage_truncated_number() {
        let (map, how) = parse_object(r#"{"action": "LIST", "confidence": 0.8"#).unwrap();
        assert_eq!(how, Recovery::Salvaged);
        assert_eq!(map["action"], "LIST");
        assert_eq!(map["confidence"], 0.8);
    }

    #[test]
    fn test_salvage_truncated_string_value() {
        let (map, _) =
            parse_object(r#"{"action": "SAVE", "reasoning": "the user wants to sto"#).unwrap();
        assert_eq!(map["action"], "SAVE");
        assert_eq!(map["reasoning"], "the user wants to sto");
    }

    #[test]
    fn test_salvage_drops_partial_key() {
        let (map, _) =
            parse_object(r#"{"action": "DELETE", "confidence": 0.7, "false_posi"#).unwrap();
        assert_eq!(map["action"], "DELETE");
        assert!(!map.contains_key("false_posi"));
    }

    #[test]
    fn test_salvage_nested() {
        let text = r#"{"action": "SAVE", "extracted_data": {"label": "email", "value": "a@b"#;
        let (map, _) = parse_object(text).unwrap();
        assert_eq!(map["extracted_data"]["label"], "email");
    }

    #[test]
    fn test_no_object() {
        assert!(parse_object("The action is SAVE").is_none());
        assert!(parse_object("[1, 2, 3]").is_none());
    }
}
