//! Small shared utilities.

use chrono::Utc;

/// Current time as an ISO-8601 / RFC 3339 UTC timestamp.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Truncate a string to at most `max_chars` characters, appending `marker`
/// when truncation occurred.
///
/// Counts characters rather than bytes so multi-byte text never gets cut
/// mid-codepoint.
pub fn truncate_with_marker(text: &str, max_chars: usize, marker: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(marker);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate_with_marker("hello", 10, "..."), "hello");
    }

    #[test]
    fn test_truncate_exact_length_unchanged() {
        assert_eq!(truncate_with_marker("hello", 5, "..."), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(
            truncate_with_marker("hello world", 5, "... (truncated)"),
            "hello... (truncated)"
        );
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let text = "héllo wörld";
        let out = truncate_with_marker(text, 6, "...");
        assert_eq!(out, "héllo ...");
    }

    #[test]
    fn test_now_iso_parses_back() {
        let ts = now_iso();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
