//! Auto-reply rules: keyword lists, reply payloads and identity signatures.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::responder::span::FormattingSpan;

/// Separates keywords on the left side of an `/add` command.
pub const KEYWORD_SEPARATOR: &str = "||";

/// The message a rule sends back, with its styling in reply-local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyContent {
    pub text: String,
    #[serde(default)]
    pub formatting: Vec<FormattingSpan>,
}

impl ReplyContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            formatting: Vec::new(),
        }
    }
}

/// One keyword rule of a chat.
///
/// `signature` identifies the rule by its keyword set independent of order, so
/// re-adding the same keywords replaces the rule instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub signature: String,
    pub keywords: Vec<String>,
    pub reply: ReplyContent,
    pub updated_at: i64,
}

/// Splits raw `/add` input on [`KEYWORD_SEPARATOR`] and normalizes the parts.
pub fn normalize_keywords(raw: &str) -> Vec<String> {
    normalize_list(raw.split(KEYWORD_SEPARATOR).map(str::to_string).collect())
}

/// Trims, drops empties, dedupes keeping first occurrences, then sorts longest
/// first. The sort is stable: equal-length keywords keep their relative order.
/// Longest-first matters to the matcher, which probes keywords in stored order
/// and would otherwise let "install" shadow "install all".
pub(crate) fn normalize_list(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords: Vec<String> = items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.clone()))
        .collect();
    keywords.sort_by(|a, b| b.len().cmp(&a.len()));
    keywords
}

/// Canonical identity of a keyword set: a lexicographically sorted copy joined
/// with the separator. The stored keyword order stays untouched.
pub fn compute_signature(keywords: &[String]) -> String {
    let mut sorted: Vec<&str> = keywords.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(KEYWORD_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_drops_empty_segments() {
        assert_eq!(
            normalize_keywords("  hello || || world  "),
            vec!["hello", "world"]
        );
        assert!(normalize_keywords("").is_empty());
        assert!(normalize_keywords(" || || ").is_empty());
    }

    #[test]
    fn normalize_dedupes_keeping_first_occurrence() {
        assert_eq!(normalize_keywords("hi||yo||hi"), vec!["hi", "yo"]);
    }

    #[test]
    fn normalize_sorts_longest_first() {
        assert_eq!(
            normalize_keywords("install||install all"),
            vec!["install all", "install"]
        );
    }

    #[test]
    fn normalize_is_stable_for_equal_lengths() {
        assert_eq!(normalize_keywords("bb||aa||cc"), vec!["bb", "aa", "cc"]);
    }

    #[test]
    fn normalize_sorts_by_byte_length() {
        // "héé" is 5 bytes, "hey!" is 4: byte length decides, not chars.
        assert_eq!(normalize_keywords("hey!||héé"), vec!["héé", "hey!"]);
    }

    #[test]
    fn signature_ignores_keyword_order() {
        let a = normalize_keywords("world||hello");
        let b = normalize_keywords("hello||world");
        assert_eq!(compute_signature(&a), compute_signature(&b));
    }

    #[test]
    fn signature_is_sorted_join() {
        let keywords = vec!["banana".to_string(), "apple".to_string()];
        assert_eq!(compute_signature(&keywords), "apple||banana");
        // The input order is preserved.
        assert_eq!(keywords, vec!["banana", "apple"]);
    }

    #[test]
    fn plain_reply_serializes_with_empty_formatting() {
        let json = serde_json::to_value(ReplyContent::plain("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi", "formatting": [] }));
    }
}
