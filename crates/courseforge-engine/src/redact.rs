//! PII redaction applied to stored run outputs and event metadata.
//!
//! String leaves are scrubbed of emails, phone numbers, and long ID-like
//! digit runs before anything is written to the store. The deep walk is
//! depth-capped so a pathologically nested payload cannot blow the stack.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Maximum nesting depth the deep redactor will descend into.
const MAX_REDACT_DEPTH: usize = 64;

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email pattern")
    })
}

fn phone_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\+?\d[\d\s().-]{7,}\d").expect("valid phone pattern")
    })
}

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{6,}\b").expect("valid id pattern"))
}

/// Redact PII from a flat string.
pub fn redact_text(text: &str) -> String {
    let scrubbed = email_pattern().replace_all(text, "[email redacted]");
    let scrubbed = phone_pattern().replace_all(&scrubbed, "[number redacted]");
    id_pattern()
        .replace_all(&scrubbed, "[number redacted]")
        .into_owned()
}

/// Redact PII from every string leaf of a JSON value.
///
/// Containers are rebuilt; non-string scalars pass through unchanged.
/// Nesting beyond [`MAX_REDACT_DEPTH`] is replaced wholesale.
pub fn redact_pii_deep(value: &Value) -> Value {
    redact_at_depth(value, 0)
}

fn redact_at_depth(value: &Value, depth: usize) -> Value {
    if depth >= MAX_REDACT_DEPTH {
        return Value::String("[truncated: nesting too deep]".to_string());
    }
    match value {
        Value::String(s) => Value::String(redact_text(s)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_at_depth(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), redact_at_depth(item, depth + 1));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_email() {
        let out = redact_text("contact alice@example.org for access");
        assert_eq!(out, "contact [email redacted] for access");
    }

    #[test]
    fn test_redacts_phone() {
        let out = redact_text("call +1 (555) 123-4567 today");
        assert!(!out.contains("555"));
        assert!(out.contains("[number redacted]"));
    }

    #[test]
    fn test_redacts_long_digit_runs() {
        let out = redact_text("student id 123456789");
        assert_eq!(out, "student id [number redacted]");
    }

    #[test]
    fn test_short_numbers_kept() {
        assert_eq!(redact_text("chapter 12 of 30"), "chapter 12 of 30");
    }

    #[test]
    fn test_deep_redaction_walks_containers() {
        let input = json!({
            "title": "Intro to Rust",
            "authors": [{"email": "bob@example.com"}],
            "pages": 240,
        });
        let out = redact_pii_deep(&input);
        assert_eq!(out["title"], "Intro to Rust");
        assert_eq!(out["authors"][0]["email"], "[email redacted]");
        assert_eq!(out["pages"], 240);
    }

    #[test]
    fn test_depth_cap() {
        let mut value = json!("leaf");
        for _ in 0..(MAX_REDACT_DEPTH + 10) {
            value = json!([value]);
        }
        // Must terminate rather than recurse without bound.
        let out = redact_pii_deep(&value);
        assert!(out.is_array());
    }
}
