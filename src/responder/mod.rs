//! Keyword auto-responder: rules, matching, cooldowns and ephemeral replies.

pub mod command;
pub mod cooldown;
pub mod engine;
pub mod ephemeral;
pub mod kv;
pub mod matcher;
pub mod rule;
pub mod span;
pub mod store;
pub mod telegram;

pub use engine::{Incoming, Responder, ResponderConfig};
pub use ephemeral::Scheduler;
pub use kv::{KvStore, SqliteKv};
pub use telegram::TelegramSender;
