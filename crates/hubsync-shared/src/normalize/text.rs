use serde_json::Value;

/// Extract the plain text of a message from the hub's dual-format field.
///
/// The hub sends either a plain string, a string holding a serialized JSON
/// object with a `text` member, or an already structured object.
pub fn extract_message_text(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => extract_from_string(s),
        Value::Object(map) => match map.get("text") {
            Some(inner) => plain(inner),
            None => raw.to_string(),
        },
        other => plain(other),
    }
}

fn extract_from_string(s: &str) -> String {
    let trimmed = s.trim_start();
    if !trimmed.starts_with('{') {
        return s.to_string();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get("text") {
            Some(inner) => plain(inner),
            None => s.to_string(),
        },
        _ => s.to_string(),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_is_empty() {
        assert_eq!(extract_message_text(&Value::Null), "");
    }

    #[test]
    fn plain_string_passes_through() {
        assert_eq!(extract_message_text(&json!("hello there")), "hello there");
    }

    #[test]
    fn serialized_object_yields_text_member() {
        let raw = json!(r#"{"text":"from json","entities":[]}"#);
        assert_eq!(extract_message_text(&raw), "from json");
    }

    #[test]
    fn malformed_json_falls_back_to_raw_string() {
        let raw = json!(r#"{"text": "unterminated"#);
        assert_eq!(extract_message_text(&raw), r#"{"text": "unterminated"#);
    }

    #[test]
    fn serialized_object_without_text_is_kept_verbatim() {
        let raw = json!(r#"{"kind":"sticker"}"#);
        assert_eq!(extract_message_text(&raw), r#"{"kind":"sticker"}"#);
    }

    #[test]
    fn structured_object_text_is_stringified() {
        assert_eq!(extract_message_text(&json!({ "text": "hi" })), "hi");
        assert_eq!(extract_message_text(&json!({ "text": 42 })), "42");
    }

    #[test]
    fn other_values_are_stringified() {
        assert_eq!(extract_message_text(&json!(7)), "7");
        assert_eq!(extract_message_text(&json!(true)), "true");
        assert_eq!(extract_message_text(&json!({ "body": "x" })), r#"{"body":"x"}"#);
    }
}
