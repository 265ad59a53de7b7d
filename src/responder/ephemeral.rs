//! Ephemeral replies: send a message, then erase it after its time is up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::responder::rule::ReplyContent;
use crate::responder::telegram::ChatApi;

/// A message due for deletion once `ttl` has elapsed.
#[derive(Debug, Clone, Copy)]
pub struct DeleteAfter {
    pub chat_id: i64,
    pub message_id: i64,
    pub ttl: Duration,
}

/// Tracks detached timer tasks so shutdown can drain pending deletions
/// instead of dropping them mid-flight.
#[derive(Clone, Default)]
pub struct Scheduler {
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_after<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            sleep(delay).await;
            task.await;
        });
    }

    /// Waits for every scheduled task to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Sends replies and schedules their teardown. Transport failures are logged
/// and swallowed here; a missed reply or deletion never escalates into the
/// message handler.
pub struct EphemeralSender {
    api: Arc<dyn ChatApi>,
    scheduler: Scheduler,
}

impl EphemeralSender {
    pub fn new(api: Arc<dyn ChatApi>, scheduler: Scheduler) -> Self {
        Self { api, scheduler }
    }

    /// Sends `content`, schedules its deletion after `ttl`, and optionally
    /// schedules deletion of another message (typically the user's trigger).
    /// Returns the sent message id, or `None` when the send failed.
    pub async fn send_ephemeral(
        &self,
        chat_id: i64,
        content: &ReplyContent,
        ttl: Duration,
        also_delete: Option<DeleteAfter>,
    ) -> Option<i64> {
        self.dispatch(chat_id, content, Some(ttl), also_delete).await
    }

    /// Like [`send_ephemeral`](Self::send_ephemeral) but the sent message stays.
    pub async fn send_and_keep(
        &self,
        chat_id: i64,
        content: &ReplyContent,
        also_delete: Option<DeleteAfter>,
    ) -> Option<i64> {
        self.dispatch(chat_id, content, None, also_delete).await
    }

    async fn dispatch(
        &self,
        chat_id: i64,
        content: &ReplyContent,
        ttl: Option<Duration>,
        also_delete: Option<DeleteAfter>,
    ) -> Option<i64> {
        // The companion deletion happens whether or not the send goes through.
        if let Some(target) = also_delete {
            self.schedule_delete(target);
        }

        let message_id = match self.api.send(chat_id, content).await {
            Ok(id) => id,
            Err(e) => {
                warn!("send to chat {chat_id} failed: {e}");
                return None;
            }
        };

        if let Some(ttl) = ttl {
            self.schedule_delete(DeleteAfter {
                chat_id,
                message_id,
                ttl,
            });
        }
        Some(message_id)
    }

    /// Fire-and-forget deletion. Failures are expected (the message may
    /// already be gone) and only logged.
    pub fn schedule_delete(&self, target: DeleteAfter) {
        let api = self.api.clone();
        self.scheduler.run_after(target.ttl, async move {
            if let Err(e) = api.delete(target.chat_id, target.message_id).await {
                debug!(
                    "delete of message {} in chat {} failed: {e}",
                    target.message_id, target.chat_id
                );
            }
        });
    }
}
