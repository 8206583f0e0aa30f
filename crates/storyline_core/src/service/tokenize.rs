//! Submission tokenization.
//!
//! The only tokenization rule: trim, collapse whitespace runs to one space,
//! split on that space. Each fragment becomes one token row.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Trims `text` and collapses every internal whitespace run to one space.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Splits `text` into token values.
///
/// Blank input yields no fragments.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    normalized.split(' ').map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::{normalize_whitespace, tokenize};

    #[test]
    fn collapses_and_trims_whitespace() {
        assert_eq!(tokenize("  hello   world  "), vec!["hello", "world"]);
    }

    #[test]
    fn treats_tabs_and_newlines_as_separators() {
        assert_eq!(tokenize("a\tb\n\nc"), vec!["a", "b", "c"]);
        assert_eq!(normalize_whitespace(" a \r\n b "), "a b");
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(tokenize("   \t ").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn punctuation_stays_attached() {
        assert_eq!(tokenize("Once, upon a-time."), vec!["Once,", "upon", "a-time."]);
    }
}
