//! Lenient JSON recovery for language-model output.
//!
//! Models wrap JSON in prose, code fences or thinking blocks. Every consumer
//! goes through these helpers instead of calling `serde_json` on raw output,
//! and gets an `Option` back: `None` means "nothing usable", never a panic.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Locate the first balanced `open ... close` span, ignoring brackets inside
/// JSON string literals.
fn balanced_span(text: &str, start: usize, open: u8, close: u8) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Candidate spans in order of appearance: one per `open` byte that starts a balanced region.
fn candidates(text: &str, open: u8, close: u8) -> impl Iterator<Item = &str> {
    text.bytes()
        .enumerate()
        .filter(move |&(_, b)| b == open)
        .filter_map(move |(i, _)| balanced_span(text, i, open, close))
}

/// First balanced `[...]` substring, whether or not it is valid JSON.
pub fn extract_json_array(text: &str) -> Option<&str> {
    candidates(text, b'[', b']').next()
}

/// First balanced `{...}` substring, whether or not it is valid JSON.
pub fn extract_json_object(text: &str) -> Option<&str> {
    candidates(text, b'{', b'}').next()
}

/// First `[...]` span that parses as a JSON array.
pub fn parse_json_array(text: &str) -> Option<Vec<Value>> {
    candidates(text, b'[', b']').find_map(|span| match serde_json::from_str::<Value>(span) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    })
}

/// First `{...}` span that parses as a JSON object.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    candidates(text, b'{', b'}').find_map(|span| match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    })
}

/// Deserialize each element independently, skipping the ones that do not fit `T`.
pub fn parse_array_lenient<T: DeserializeOwned>(items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn array_inside_prose() {
        let text = "Sure! Here are the facts:\n[{\"type\": \"number\", \"value\": 5}]\nLet me know.";
        let items = parse_json_array(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["value"], json!(5));
    }

    #[test]
    fn array_inside_code_fence() {
        let text = "```json\n[1, 2, 3]\n```";
        assert_eq!(parse_json_array(text).unwrap(), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let text = r#"[{"context": "price [USD] ]] weird", "value": 1}] trailing ]"#;
        let span = extract_json_array(text).unwrap();
        assert!(span.ends_with("}]"));
        assert_eq!(parse_json_array(text).unwrap().len(), 1);
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let text = r#"[{"context": "he said \"[hi]\"", "value": 2}]"#;
        assert_eq!(parse_json_array(text).unwrap().len(), 1);
    }

    #[test]
    fn skips_non_json_bracket_spans() {
        let text = "See [note 1]. Data: [10, 20]";
        assert_eq!(extract_json_array(text), Some("[note 1]"));
        assert_eq!(parse_json_array(text).unwrap(), vec![json!(10), json!(20)]);
    }

    #[test]
    fn unbalanced_returns_none() {
        assert!(parse_json_array("[{\"value\": 1}").is_none());
        assert!(extract_json_array("no brackets at all").is_none());
    }

    #[test]
    fn plain_text_returns_none() {
        assert!(parse_json_array("The price is 200 dollars.").is_none());
        assert!(parse_json_object("The price is 200 dollars.").is_none());
    }

    #[test]
    fn object_extraction() {
        let text = "result: {\"summary\": \"ok\", \"nested\": {\"a\": 1}} done";
        let map = parse_json_object(text).unwrap();
        assert_eq!(map["summary"], json!("ok"));
    }

    #[test]
    fn lenient_array_skips_bad_items() {
        #[derive(Deserialize)]
        struct Item {
            value: f64,
        }
        let items = vec![json!({"value": 1.5}), json!({"other": true}), json!({"value": 3})];
        let parsed: Vec<Item> = parse_array_lenient(&items);
        assert_eq!(parsed.len(), 2);
        assert!((parsed[1].value - 3.0).abs() < f64::EPSILON);
    }
}
