//! Slash-command routing and argument parsing.

use regex::Regex;

use crate::responder::span::utf16_len;

/// Splits keywords from the reply in `/add keywords===reply`.
const REPLY_SEPARATOR: &str = "===";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Add,
    Del,
    List,
    ListAll,
    Admin,
    Start,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// Starts with `/` but is not a command we know.
    Unknown,
    /// Explicitly addressed to some other bot.
    NotForUs,
    /// Ordinary text, a candidate for keyword matching.
    Plain,
}

/// Classifies a message by its first token. A `@target` suffix on that token
/// routes the message away unless it names this bot.
pub fn route(text: &str, bot_username: Option<&str>) -> Route {
    let first = text.split_whitespace().next().unwrap_or("");
    let (word, target) = match first.split_once('@') {
        Some((word, target)) => (word, Some(target)),
        None => (first, None),
    };

    if let Some(target) = target
        && bot_username != Some(target)
    {
        return Route::NotForUs;
    }
    if !word.starts_with('/') {
        return Route::Plain;
    }

    match word {
        "/add" => Route::Command(Command::Add),
        "/del" => Route::Command(Command::Del),
        "/list" => Route::Command(Command::List),
        "/listAll" => Route::Command(Command::ListAll),
        "/admin" => Route::Command(Command::Admin),
        "/start" => Route::Command(Command::Start),
        "/help" => Route::Command(Command::Help),
        _ => Route::Unknown,
    }
}

/// Parsed `/add` arguments. `reply_start` is the UTF-16 offset of the reply
/// text within the full command, the coordinate space Telegram entities use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddArgs {
    pub raw_keywords: String,
    pub reply_text: String,
    pub reply_start: u32,
}

/// `None` means the command is malformed (missing argument or separator).
/// Empty keywords or reply are left for rule validation to reject, so the
/// user gets told which of the two problems they have.
pub fn parse_add(text: &str) -> Option<AddArgs> {
    if !text.starts_with("/add ") {
        return None;
    }
    let sep = text.find(REPLY_SEPARATOR)?;

    let raw_keywords = text[5..sep].trim().to_string();
    let after = &text[sep + REPLY_SEPARATOR.len()..];
    let reply_text = after.trim().to_string();
    // Offset of the trimmed reply's first character, not of the separator,
    // so stored spans line up with the stored text.
    let leading_ws = after.len() - after.trim_start().len();
    let reply_start = utf16_len(&text[..sep + REPLY_SEPARATOR.len() + leading_ws]);

    Some(AddArgs {
        raw_keywords,
        reply_text,
        reply_start,
    })
}

/// The keyword argument of `/del`, trimmed. `None` when there is none.
pub fn parse_del(text: &str) -> Option<String> {
    let caps = Regex::new(r"/del\s+(.+)").unwrap().captures(text)?;
    Some(caps[1].trim().to_string())
}
