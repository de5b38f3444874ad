//! Best-effort JSON coercion shared by every probe

use serde_json::Value;

/// Parse `text` as JSON, returning `None` instead of an error
pub fn try_parse(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::trace!("Not JSON ({}): {:.40}", e, trimmed);
            None
        }
    }
}

/// Parse `text` as JSON, keeping the raw string when it isn't JSON
pub fn parse_or_string(text: &str) -> Value {
    try_parse(text).unwrap_or_else(|| Value::String(text.to_string()))
}

/// Whether trimmed `text` opens a JSON object or array
pub fn looks_like_json(text: &str) -> bool {
    matches!(text.trim_start().as_bytes().first(), Some(b'{') | Some(b'['))
}

/// Cap `text` at `limit` characters (not bytes)
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_try_parse() {
        assert_eq!(try_parse(" {\"a\": 1} "), Some(json!({"a": 1})));
        assert_eq!(try_parse("[1,2]"), Some(json!([1, 2])));
        assert_eq!(try_parse("{broken"), None);
        assert_eq!(try_parse("   "), None);
    }

    #[test]
    fn test_parse_or_string() {
        assert_eq!(parse_or_string("42"), json!(42));
        assert_eq!(parse_or_string("dark-theme"), json!("dark-theme"));
    }

    #[test]
    fn test_looks_like_json() {
        assert!(looks_like_json("\n  {\"x\":1}"));
        assert!(looks_like_json("[]"));
        assert!(!looks_like_json("window.x = {}"));
        assert!(!looks_like_json(""));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("♞♞♞♞", 2), "♞♞");
        assert_eq!(truncate_chars("short", 500), "short");
        assert_eq!(truncate_chars(&"x".repeat(10_000), 500).len(), 500);
    }
}
