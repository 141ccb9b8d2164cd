//! Event-message sanitization.
//!
//! Every event message passes through [`sanitize_message`] before it is
//! stored: whitespace is collapsed, PII is redacted, and the result is
//! capped at a fixed length so a dumped agent payload cannot bloat the
//! audit log.

use crate::redact::redact_text;

/// Maximum stored length of an event message, in characters.
pub const MAX_EVENT_MESSAGE_CHARS: usize = 400;

/// Normalize whitespace, redact PII, and truncate with an ellipsis.
pub fn sanitize_message(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&redact_text(&collapsed), MAX_EVENT_MESSAGE_CHARS)
}

/// Truncate to `max` characters, appending an ellipsis when shortened.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(sanitize_message("a\n\n  b\t c"), "a b c");
    }

    #[test]
    fn test_truncates_long_messages() {
        let long = "x".repeat(MAX_EVENT_MESSAGE_CHARS + 50);
        let out = sanitize_message(&long);
        assert_eq!(out.chars().count(), MAX_EVENT_MESSAGE_CHARS + 1);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_short_messages_untouched() {
        assert_eq!(sanitize_message("all good"), "all good");
    }

    #[test]
    fn test_redacts_email_in_message() {
        let out = sanitize_message("reach me at jane.doe@example.com please");
        assert!(!out.contains("jane.doe@example.com"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        let out = truncate_chars(&text, 5);
        assert_eq!(out.chars().count(), 6);
    }
}
