//! Transport seam between the responder and the Telegram Bot API.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};
use thiserror::Error;

use crate::responder::rule::ReplyContent;
use crate::responder::span;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("telegram api: {0}")]
    Api(String),
}

/// What the responder needs from the chat platform. Kept narrow so tests can
/// stand in a recording fake.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Sends `content` to a chat and returns the new message's id.
    async fn send(&self, chat_id: i64, content: &ReplyContent) -> Result<i64, TransportError>;
    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError>;
    /// User ids of the chat's current administrators.
    async fn chat_admins(&self, chat_id: i64) -> Result<Vec<i64>, TransportError>;
}

/// Production transport over a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatApi for TelegramSender {
    async fn send(&self, chat_id: i64, content: &ReplyContent) -> Result<i64, TransportError> {
        let mut request = self.bot.send_message(ChatId(chat_id), content.text.clone());
        let entities = span::to_entities(&content.formatting);
        if !entities.is_empty() {
            request = request.entities(entities);
        }
        match request.await {
            Ok(message) => Ok(message.id.0 as i64),
            Err(e) => Err(TransportError::Api(e.to_string())),
        }
    }

    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Api(e.to_string()))
    }

    async fn chat_admins(&self, chat_id: i64) -> Result<Vec<i64>, TransportError> {
        let members = self
            .bot
            .get_chat_administrators(ChatId(chat_id))
            .await
            .map_err(|e| TransportError::Api(e.to_string()))?;
        Ok(members
            .iter()
            .map(|member| member.user.id.0 as i64)
            .collect())
    }
}
