//! Formatting spans: the slice of a message's styling that belongs to a reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use teloxide::types::MessageEntity;

/// One run of styled text, in UTF-16 code units like Telegram counts them.
///
/// `kind` carries the Bot API entity type name ("bold", "code", "text_link", ...)
/// so spans survive storage without this crate having to enumerate every style
/// Telegram supports. `extra` holds the single payload some kinds carry: the URL
/// of a `text_link`, the language of a `pre` block, the user id of a
/// `text_mention`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingSpan {
    pub kind: String,
    pub offset: u32,
    pub length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

/// Length of `s` in UTF-16 code units, the unit Telegram entity offsets use.
pub fn utf16_len(s: &str) -> u32 {
    s.encode_utf16().count() as u32
}

/// Re-expresses spans in the coordinate space of a reply substring that starts
/// at `reply_start`. Spans beginning before the substring are dropped, even if
/// they overlap into it; the rest shift left by `reply_start`.
pub fn rebase(spans: &[FormattingSpan], reply_start: u32) -> Vec<FormattingSpan> {
    spans
        .iter()
        .filter(|span| span.offset >= reply_start)
        .map(|span| FormattingSpan {
            offset: span.offset - reply_start,
            ..span.clone()
        })
        .collect()
}

/// Converts an incoming Telegram entity into a span via its Bot API JSON shape,
/// which keeps `kind` byte-identical to the API's type names.
pub fn from_entity(entity: &MessageEntity) -> Option<FormattingSpan> {
    let wire = serde_json::to_value(entity).ok()?;
    let kind = wire.get("type")?.as_str()?.to_string();
    let offset = u32::try_from(wire.get("offset")?.as_u64()?).ok()?;
    let length = u32::try_from(wire.get("length")?.as_u64()?).ok()?;
    let extra = wire
        .get("url")
        .or_else(|| wire.get("language"))
        .or_else(|| wire.get("custom_emoji_id"))
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| {
            wire.get("user")
                .and_then(|user| user.get("id"))
                .and_then(Value::as_i64)
                .map(|id| id.to_string())
        });
    Some(FormattingSpan {
        kind,
        offset,
        length,
        extra,
    })
}

pub fn from_entities(entities: &[MessageEntity]) -> Vec<FormattingSpan> {
    entities.iter().filter_map(from_entity).collect()
}

/// Rebuilds a sendable Telegram entity from a stored span. Spans whose kind the
/// Bot API does not recognize, or whose payload cannot be reconstructed, come
/// back as `None` and are left off the outgoing message.
pub fn to_entity(span: &FormattingSpan) -> Option<MessageEntity> {
    let mut wire = serde_json::Map::new();
    wire.insert("type".to_string(), Value::String(span.kind.clone()));
    wire.insert("offset".to_string(), span.offset.into());
    wire.insert("length".to_string(), span.length.into());
    if let Some(extra) = &span.extra {
        match span.kind.as_str() {
            "text_link" => {
                wire.insert("url".to_string(), Value::String(extra.clone()));
            }
            "pre" => {
                wire.insert("language".to_string(), Value::String(extra.clone()));
            }
            "custom_emoji" => {
                wire.insert("custom_emoji_id".to_string(), Value::String(extra.clone()));
            }
            "text_mention" => {
                let user_id: i64 = extra.parse().ok()?;
                wire.insert(
                    "user".to_string(),
                    serde_json::json!({ "id": user_id, "is_bot": false, "first_name": "" }),
                );
            }
            _ => {}
        }
    }
    serde_json::from_value(Value::Object(wire)).ok()
}

pub fn to_entities(spans: &[FormattingSpan]) -> Vec<MessageEntity> {
    spans.iter().filter_map(to_entity).collect()
}

/// Reads spans back out of stored JSON, dropping entries with missing or
/// non-numeric fields and entries that no longer fit inside `text`.
pub(crate) fn sanitize(values: &[Value], text: &str) -> Vec<FormattingSpan> {
    let limit = u64::from(utf16_len(text));
    values
        .iter()
        .filter_map(from_stored)
        .filter(|span| span.length > 0 && u64::from(span.offset) + u64::from(span.length) <= limit)
        .collect()
}

fn from_stored(value: &Value) -> Option<FormattingSpan> {
    let kind = value.get("kind")?.as_str()?.to_string();
    let offset = u32::try_from(value.get("offset")?.as_u64()?).ok()?;
    let length = u32::try_from(value.get("length")?.as_u64()?).ok()?;
    let extra = value.get("extra").and_then(Value::as_str).map(String::from);
    Some(FormattingSpan {
        kind,
        offset,
        length,
        extra,
    })
}
