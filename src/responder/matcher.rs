//! Keyword matching against incoming plain text.

use crate::responder::rule::Rule;

/// A winning rule plus the stored keyword (original casing) that fired.
#[derive(Debug, PartialEq)]
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    pub keyword: &'a str,
}

/// First keyword hit, probing rules in stored order and each rule's keywords
/// in stored order. Keywords are stored longest first, so within a rule the
/// most specific trigger wins.
///
/// Matching is case-insensitive substring containment. The equality arm is
/// redundant with `contains` but spells out that a message consisting of
/// nothing but the keyword counts too.
pub fn find_match<'a>(rules: &'a [Rule], text: &str) -> Option<RuleMatch<'a>> {
    let incoming = text.to_lowercase();
    for rule in rules {
        for keyword in &rule.keywords {
            let needle = keyword.to_lowercase();
            if incoming.contains(&needle) || incoming == needle {
                return Some(RuleMatch { rule, keyword });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::rule::{self, ReplyContent, Rule};

    fn make_rule(raw_keywords: &str, reply: &str) -> Rule {
        let keywords = rule::normalize_keywords(raw_keywords);
        Rule {
            signature: rule::compute_signature(&keywords),
            keywords,
            reply: ReplyContent::plain(reply),
            updated_at: 0,
        }
    }

    #[test]
    fn no_rules_means_no_match() {
        assert!(find_match(&[], "anything").is_none());
    }

    #[test]
    fn matches_substring_case_insensitively() {
        let rules = vec![make_rule("hello", "hi there")];
        let hit = find_match(&rules, "well HELLO friend").unwrap();
        assert_eq!(hit.keyword, "hello");
        assert_eq!(hit.rule.reply.text, "hi there");
    }

    #[test]
    fn keeps_stored_keyword_casing() {
        let rules = vec![make_rule("HeLLo", "hi")];
        let hit = find_match(&rules, "hello").unwrap();
        assert_eq!(hit.keyword, "HeLLo");
    }

    #[test]
    fn earlier_rule_wins() {
        let rules = vec![make_rule("alpha", "first"), make_rule("alpha", "second")];
        assert_eq!(find_match(&rules, "alpha").unwrap().rule.reply.text, "first");
    }

    #[test]
    fn earlier_rule_beats_a_more_specific_later_one() {
        // Not greedy across rules: rule order outranks keyword specificity.
        let rules = vec![make_rule("hi", "short"), make_rule("hi there", "long")];
        let hit = find_match(&rules, "hi there").unwrap();
        assert_eq!(hit.keyword, "hi");
        assert_eq!(hit.rule.reply.text, "short");
    }

    #[test]
    fn longer_keyword_wins_within_a_rule() {
        let rules = vec![make_rule("install||install all", "ok")];
        let hit = find_match(&rules, "please install all of it").unwrap();
        assert_eq!(hit.keyword, "install all");
    }

    #[test]
    fn falls_through_to_shorter_keyword() {
        let rules = vec![make_rule("install||install all", "ok")];
        let hit = find_match(&rules, "install it").unwrap();
        assert_eq!(hit.keyword, "install");
    }

    #[test]
    fn no_keyword_in_text_means_none() {
        let rules = vec![make_rule("hello", "hi")];
        assert!(find_match(&rules, "goodbye").is_none());
    }

    #[test]
    fn unicode_keywords_match_case_insensitively() {
        let rules = vec![make_rule("grüße", "servus")];
        assert!(find_match(&rules, "GRÜSSE an alle").is_none());
        assert!(find_match(&rules, "GRÜẞE an alle").is_some());
    }
}
