//! Per-chat rule sets on top of the key-value store.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::responder::kv::{KvStore, StoreError};
use crate::responder::rule::{self, ReplyContent, Rule};
use crate::responder::span;

/// Key namespace holding one JSON rule array per chat.
pub const RULES_PREFIX: &str = "rules_";

pub fn rules_key(chat_id: i64) -> String {
    format!("{RULES_PREFIX}{chat_id}")
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("{0}")]
    Validation(String),
    #[error("no rule contains keyword `{0}`")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct RuleStore {
    kv: Arc<dyn KvStore>,
}

impl RuleStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// The chat's rules, in insertion order. Read problems degrade to an empty
    /// list so one corrupt value cannot take the matcher down.
    pub async fn load_rules(&self, chat_id: i64) -> Vec<Rule> {
        let raw = match self.kv.get(&rules_key(chat_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("rule read failed for chat {chat_id}: {e}");
                return Vec::new();
            }
        };
        decode_rules(&raw, chat_id)
    }

    /// Adds a rule, or replaces the existing rule with the same keyword-set
    /// signature in place so its list position survives the update.
    pub async fn upsert_rule(
        &self,
        chat_id: i64,
        raw_keywords: &str,
        reply: ReplyContent,
    ) -> Result<(), RuleError> {
        let keywords = rule::normalize_keywords(raw_keywords);
        if keywords.is_empty() || reply.text.trim().is_empty() {
            return Err(RuleError::Validation(
                "keywords and reply text must not be empty".to_string(),
            ));
        }

        let signature = rule::compute_signature(&keywords);
        let next = Rule {
            signature: signature.clone(),
            keywords,
            reply,
            updated_at: Utc::now().timestamp_millis(),
        };

        let mut rules = self.load_rules(chat_id).await;
        match rules.iter_mut().find(|r| r.signature == signature) {
            Some(slot) => *slot = next,
            None => rules.push(next),
        }
        self.save(chat_id, &rules).await?;
        Ok(())
    }

    /// Removes one keyword from the first rule that carries it. The rule's
    /// remaining keywords are re-normalized and its signature recomputed; a
    /// rule left without keywords is removed entirely. Later rules holding the
    /// same keyword are deliberately left alone.
    pub async fn delete_keyword(&self, chat_id: i64, keyword: &str) -> Result<(), RuleError> {
        let keyword = keyword.trim();
        let mut rules = self.load_rules(chat_id).await;
        let Some(index) = rules
            .iter()
            .position(|r| r.keywords.iter().any(|k| k == keyword))
        else {
            return Err(RuleError::NotFound(keyword.to_string()));
        };

        let target = &mut rules[index];
        target.keywords.retain(|k| k != keyword);
        if target.keywords.is_empty() {
            rules.remove(index);
        } else {
            target.keywords = rule::normalize_list(std::mem::take(&mut target.keywords));
            target.signature = rule::compute_signature(&target.keywords);
        }
        self.save(chat_id, &rules).await?;
        Ok(())
    }

    /// Every chat with a stored rule list, rules included. Read-only scan for
    /// the privileged overview command.
    pub async fn list_all_chats(&self) -> Vec<(i64, Vec<Rule>)> {
        let keys = match self.kv.list(RULES_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("rule key scan failed: {e}");
                return Vec::new();
            }
        };

        let mut chats = Vec::new();
        for key in keys {
            let Some(id_part) = key.strip_prefix(RULES_PREFIX) else {
                continue;
            };
            let Ok(chat_id) = id_part.parse::<i64>() else {
                debug!("skipping rule key with non-numeric chat id: {key}");
                continue;
            };
            chats.push((chat_id, self.load_rules(chat_id).await));
        }
        chats
    }

    async fn save(&self, chat_id: i64, rules: &[Rule]) -> Result<(), StoreError> {
        let json = serde_json::to_string(rules)?;
        self.kv.put(&rules_key(chat_id), &json).await
    }
}

/// Stored shape read leniently where it matters: keywordless rules are
/// skipped and spans go through per-entry sanitation instead of failing the
/// list. An unreadable list as a whole degrades to empty in [`decode_rules`].
#[derive(Deserialize)]
struct StoredRule {
    signature: String,
    #[serde(default)]
    keywords: Vec<String>,
    reply: StoredReply,
    #[serde(default)]
    updated_at: i64,
}

#[derive(Deserialize)]
struct StoredReply {
    #[serde(default)]
    text: String,
    #[serde(default)]
    formatting: Vec<serde_json::Value>,
}

impl StoredRule {
    fn into_rule(self) -> Option<Rule> {
        if self.keywords.is_empty() {
            return None;
        }
        let formatting = span::sanitize(&self.reply.formatting, &self.reply.text);
        Some(Rule {
            signature: self.signature,
            keywords: self.keywords,
            reply: ReplyContent {
                text: self.reply.text,
                formatting,
            },
            updated_at: self.updated_at,
        })
    }
}

fn decode_rules(raw: &str, chat_id: i64) -> Vec<Rule> {
    let stored: Vec<StoredRule> = match serde_json::from_str(raw) {
        Ok(stored) => stored,
        Err(e) => {
            warn!("discarding unreadable rule list for chat {chat_id}: {e}");
            return Vec::new();
        }
    };
    stored.into_iter().filter_map(StoredRule::into_rule).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::kv::MemoryKv;
    use crate::responder::span::FormattingSpan;

    fn make_store() -> RuleStore {
        RuleStore::new(Arc::new(MemoryKv::new()))
    }

    fn reply_with_span(text: &str, kind: &str, offset: u32, length: u32) -> ReplyContent {
        ReplyContent {
            text: text.to_string(),
            formatting: vec![FormattingSpan {
                kind: kind.to_string(),
                offset,
                length,
                extra: None,
            }],
        }
    }

    #[tokio::test]
    async fn load_returns_empty_for_unknown_chat() {
        let store = make_store();
        assert!(store.load_rules(1).await.is_empty());
    }

    #[tokio::test]
    async fn upsert_normalizes_and_persists() {
        let store = make_store();
        store
            .upsert_rule(1, " hello || hi ", ReplyContent::plain("welcome"))
            .await
            .unwrap();

        let rules = store.load_rules(1).await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].keywords, vec!["hello", "hi"]);
        assert_eq!(rules[0].signature, "hello||hi");
        assert_eq!(rules[0].reply.text, "welcome");
        assert!(rules[0].updated_at > 0);
    }

    #[tokio::test]
    async fn upsert_rejects_empty_keywords() {
        let store = make_store();
        let err = store
            .upsert_rule(1, " || ", ReplyContent::plain("reply"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::Validation(_)));
        assert!(store.load_rules(1).await.is_empty());
    }

    #[tokio::test]
    async fn upsert_rejects_blank_reply() {
        let store = make_store();
        let err = store
            .upsert_rule(1, "hello", ReplyContent::plain("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::Validation(_)));
    }

    #[tokio::test]
    async fn upsert_replaces_same_signature_in_place() {
        let store = make_store();
        store
            .upsert_rule(1, "first", ReplyContent::plain("one"))
            .await
            .unwrap();
        store
            .upsert_rule(1, "hello||hi", ReplyContent::plain("old"))
            .await
            .unwrap();
        store
            .upsert_rule(1, "last", ReplyContent::plain("three"))
            .await
            .unwrap();

        // Same keyword set in a different spelling order.
        store
            .upsert_rule(1, "hi||hello", ReplyContent::plain("new"))
            .await
            .unwrap();

        let rules = store.load_rules(1).await;
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[1].signature, "hello||hi");
        assert_eq!(rules[1].reply.text, "new");
    }

    #[tokio::test]
    async fn chats_do_not_share_rules() {
        let store = make_store();
        store
            .upsert_rule(1, "hello", ReplyContent::plain("one"))
            .await
            .unwrap();
        store
            .upsert_rule(2, "hello", ReplyContent::plain("two"))
            .await
            .unwrap();

        assert_eq!(store.load_rules(1).await[0].reply.text, "one");
        assert_eq!(store.load_rules(2).await[0].reply.text, "two");
    }

    #[tokio::test]
    async fn delete_missing_keyword_is_not_found() {
        let store = make_store();
        store
            .upsert_rule(1, "hello", ReplyContent::plain("hi"))
            .await
            .unwrap();
        let err = store.delete_keyword(1, "nope").await.unwrap_err();
        assert!(matches!(err, RuleError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_keyword_and_recomputes_signature() {
        let store = make_store();
        store
            .upsert_rule(1, "hello||hi||hey", ReplyContent::plain("greeting"))
            .await
            .unwrap();

        store.delete_keyword(1, "hello").await.unwrap();

        let rules = store.load_rules(1).await;
        assert_eq!(rules[0].keywords, vec!["hi", "hey"]);
        assert_eq!(rules[0].signature, "hey||hi");
    }

    #[tokio::test]
    async fn delete_last_keyword_removes_the_rule() {
        let store = make_store();
        store
            .upsert_rule(1, "only", ReplyContent::plain("gone soon"))
            .await
            .unwrap();
        store.delete_keyword(1, "only").await.unwrap();
        assert!(store.load_rules(1).await.is_empty());
    }

    #[tokio::test]
    async fn delete_touches_only_the_first_matching_rule() {
        let kv = Arc::new(MemoryKv::new());
        let store = RuleStore::new(kv.clone());
        // Distinct signatures can still share a keyword.
        let raw = serde_json::json!([
            { "signature": "shared", "keywords": ["shared"], "reply": { "text": "a" }, "updated_at": 0 },
            { "signature": "other||shared", "keywords": ["shared", "other"], "reply": { "text": "b" }, "updated_at": 0 }
        ]);
        kv.put(&rules_key(1), &raw.to_string()).await.unwrap();

        store.delete_keyword(1, "shared").await.unwrap();

        // The first rule lost its only keyword and is gone; the second kept it.
        let rules = store.load_rules(1).await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].keywords, vec!["shared", "other"]);
        assert_eq!(rules[0].reply.text, "b");
    }

    #[tokio::test]
    async fn delete_trims_its_argument() {
        let store = make_store();
        store
            .upsert_rule(1, "hello", ReplyContent::plain("hi"))
            .await
            .unwrap();
        store.delete_keyword(1, "  hello  ").await.unwrap();
        assert!(store.load_rules(1).await.is_empty());
    }

    #[tokio::test]
    async fn formatting_survives_a_round_trip() {
        let store = make_store();
        store
            .upsert_rule(1, "install", reply_with_span("install all", "code", 0, 11))
            .await
            .unwrap();

        let rules = store.load_rules(1).await;
        assert_eq!(rules[0].reply.formatting.len(), 1);
        assert_eq!(rules[0].reply.formatting[0].kind, "code");
        assert_eq!(rules[0].reply.formatting[0].length, 11);
    }

    #[tokio::test]
    async fn keywords_come_back_length_sorted_under_a_sorted_signature() {
        let store = make_store();
        store
            .upsert_rule(1, "install||setup", reply_with_span("install all", "code", 0, 11))
            .await
            .unwrap();

        // Stored order is by length, the signature alphabetical.
        let rules = store.load_rules(1).await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].keywords, vec!["install", "setup"]);
        assert_eq!(rules[0].signature, "install||setup");
        assert_eq!(rules[0].reply.text, "install all");
    }

    #[tokio::test]
    async fn unreadable_json_degrades_to_empty() {
        let kv = Arc::new(MemoryKv::new());
        let store = RuleStore::new(kv.clone());
        kv.put(&rules_key(1), "{ not json").await.unwrap();
        assert!(store.load_rules(1).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_spans_are_dropped_on_load() {
        let kv = Arc::new(MemoryKv::new());
        let store = RuleStore::new(kv.clone());
        let raw = serde_json::json!([{
            "signature": "hey",
            "keywords": ["hey"],
            "reply": {
                "text": "hello there",
                "formatting": [
                    { "kind": "bold", "offset": 0, "length": 5 },
                    { "kind": "bold", "offset": 0 },
                    { "kind": "bold", "offset": 6, "length": 900 }
                ]
            },
            "updated_at": 0
        }]);
        kv.put(&rules_key(1), &raw.to_string()).await.unwrap();

        let rules = store.load_rules(1).await;
        assert_eq!(rules[0].reply.formatting.len(), 1);
        assert_eq!(rules[0].reply.formatting[0].length, 5);
    }

    #[tokio::test]
    async fn keywordless_stored_rule_is_skipped() {
        let kv = Arc::new(MemoryKv::new());
        let store = RuleStore::new(kv.clone());
        let raw = serde_json::json!([
            { "signature": "", "keywords": [], "reply": { "text": "orphan" }, "updated_at": 0 },
            { "signature": "ok", "keywords": ["ok"], "reply": { "text": "fine" }, "updated_at": 0 }
        ]);
        kv.put(&rules_key(1), &raw.to_string()).await.unwrap();

        let rules = store.load_rules(1).await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].keywords, vec!["ok"]);
    }

    #[tokio::test]
    async fn list_all_chats_sees_every_rule_list() {
        let store = make_store();
        store
            .upsert_rule(-100200, "hello", ReplyContent::plain("hi"))
            .await
            .unwrap();
        store
            .upsert_rule(7, "bye", ReplyContent::plain("later"))
            .await
            .unwrap();

        let mut chats = store.list_all_chats().await;
        chats.sort_by_key(|(chat_id, _)| *chat_id);
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].0, -100200);
        assert_eq!(chats[0].1[0].keywords, vec!["hello"]);
        assert_eq!(chats[1].0, 7);
    }
}
