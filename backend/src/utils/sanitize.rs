use once_cell::sync::Lazy;
use regex::Regex;
use crate::constants::MAX_MESSAGE_LENGTH;

static HTML_MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>|&[^;]+;").expect("static regex"));
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x00-\x1F\x7F-\x9F]").expect("static regex"));
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Strips HTML tags/entities and control characters, collapses whitespace
/// and trims. Does not enforce a length.
pub fn normalize_message(input: &str) -> String {
    let no_html = HTML_MARKUP.replace_all(input, "");
    // Control characters go first, so newlines and tabs vanish instead of becoming spaces.
    let no_control = CONTROL_CHARS.replace_all(&no_html, "");
    WHITESPACE_RUNS.replace_all(&no_control, " ").trim().to_string()
}

/// `normalize_message` capped at the contract's message length.
pub fn sanitize_message(input: &str) -> String {
    normalize_message(input).chars().take(MAX_MESSAGE_LENGTH).collect()
}

/// Characters left before hitting the message limit (negative when over).
pub fn remaining_chars(message: &str) -> i64 {
    MAX_MESSAGE_LENGTH as i64 - message.chars().count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_html_and_entities() {
        assert_eq!(sanitize_message("<b>hello</b> &amp; world"), "hello world");
        assert_eq!(sanitize_message("<script>alert(1)</script>"), "alert(1)");
    }

    #[test]
    fn test_control_characters_are_removed_not_spaced() {
        assert_eq!(sanitize_message("line1\nline2"), "line1line2");
        assert_eq!(sanitize_message("a\u{0085}b"), "ab");
    }

    #[test]
    fn test_whitespace_collapsed_and_trimmed() {
        assert_eq!(sanitize_message("   gm    frens  "), "gm frens");
        assert_eq!(sanitize_message("   "), "");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let sanitized = sanitize_message(&long);
        assert_eq!(sanitized.chars().count(), MAX_MESSAGE_LENGTH);
        assert_eq!(normalize_message(&long).chars().count(), 200);
    }

    #[test]
    fn test_remaining_chars() {
        assert_eq!(remaining_chars("gm"), 138);
        assert_eq!(remaining_chars(&"x".repeat(150)), -10);
    }
}
