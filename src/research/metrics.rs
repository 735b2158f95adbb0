//! Report text metrics: cited sources and word count.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("static URL pattern is valid")
});

/// Distinct `http(s)` URLs in the order they first appear.
///
/// Trailing sentence punctuation and closing brackets are not part of a URL.
pub fn extract_sources(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')', '!', '?', '\'']))
        .filter(|url| url.len() > "https://".len())
        .filter(|url| seen.insert(url.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn count_sources(text: &str) -> u32 {
    extract_sources(text).len() as u32
}

/// Whitespace-separated tokens.
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
