//! Per-user rate limiting for auto-replies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::responder::kv::KvStore;

pub fn cooldown_key(chat_id: i64, user_id: i64) -> String {
    format!("cooldown_{chat_id}_{user_id}")
}

/// Fixed-window gate keyed on (chat, user). Stamps are epoch milliseconds
/// stored as decimal strings and are never deleted, only overwritten.
#[derive(Clone)]
pub struct CooldownGate {
    kv: Arc<dyn KvStore>,
    window: Duration,
}

impl CooldownGate {
    pub fn new(kv: Arc<dyn KvStore>, window: Duration) -> Self {
        Self { kv, window }
    }

    /// True when the user is still inside the window; the stamp is left as is,
    /// so hammering does not extend the suppression. Otherwise stamps now and
    /// lets the caller proceed. An unreadable stamp counts as expired.
    pub async fn check_and_stamp(&self, chat_id: i64, user_id: i64) -> bool {
        let key = cooldown_key(chat_id, user_id);
        let now = Utc::now().timestamp_millis();

        if let Ok(Some(stored)) = self.kv.get(&key).await
            && let Ok(last) = stored.trim().parse::<i64>()
            && now - last < self.window.as_millis() as i64
        {
            return true;
        }

        if let Err(e) = self.kv.put(&key, &now.to_string()).await {
            warn!("cooldown stamp failed for chat {chat_id} user {user_id}: {e}");
        }
        false
    }
}
