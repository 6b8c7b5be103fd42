//! Text helpers shared by the extractor and the verification loop.

use super::constants::{MAX_PLAIN_TEXT_CHARS, TRUNCATION_MARKER};

/// Collapse runs of whitespace inside each line and drop empty lines.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `text` to [`MAX_PLAIN_TEXT_CHARS`] characters, appending the marker
/// when anything was removed.
#[must_use]
pub fn truncate_plain_text(text: &str) -> String {
    truncate_chars(text, MAX_PLAIN_TEXT_CHARS, TRUNCATION_MARKER)
}

/// Cut `text` to at most `max_chars` characters (not bytes) and append
/// `marker` if truncation happened.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + marker.len());
            out.push_str(&text[..byte_idx]);
            out.push_str(marker);
            out
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_per_line() {
        assert_eq!(normalize_whitespace("  a \t b \n\n   \n c  "), "a b\nc");
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_plain_text("你好"), "你好");
    }

    #[test]
    fn truncation_counts_characters() {
        let text = "测".repeat(MAX_PLAIN_TEXT_CHARS + 10);
        let out = truncate_plain_text(&text);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            out.chars().count(),
            MAX_PLAIN_TEXT_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }
}
