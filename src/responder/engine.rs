//! The responder: routes incoming messages to command handlers or keyword
//! matching and shapes every outgoing reply as an ephemeral message.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::responder::command::{self, Command, Route};
use crate::responder::cooldown::CooldownGate;
use crate::responder::ephemeral::{DeleteAfter, EphemeralSender, Scheduler};
use crate::responder::kv::KvStore;
use crate::responder::matcher;
use crate::responder::rule::{ReplyContent, Rule};
use crate::responder::span;
use crate::responder::store::{RuleError, RuleStore};
use crate::responder::telegram::ChatApi;

/// How long the user's trigger or command message survives before cleanup.
const TRIGGER_TTL: Duration = Duration::from_secs(3);
const CONFIRM_TTL: Duration = Duration::from_secs(4);
const NOTICE_TTL: Duration = Duration::from_secs(5);
const ERROR_TTL: Duration = Duration::from_secs(6);
const ADD_USAGE_TTL: Duration = Duration::from_secs(7);
const ADMIN_LIST_TTL: Duration = Duration::from_secs(10);
const START_TTL: Duration = Duration::from_secs(12);
const LIST_TTL: Duration = Duration::from_secs(15);
const HELP_TTL: Duration = Duration::from_secs(15);
const OVERVIEW_TTL: Duration = Duration::from_secs(20);

const NOT_ALLOWED: &str = "❌ You are not allowed to use this command.";
const UNKNOWN_COMMAND: &str = "❌ Unknown command, send /help to see what I understand.";
const ADD_USAGE: &str =
    "❌ Wrong format. Use: /add keyword1||keyword2===reply text\n(one reply per rule, || only separates keywords)";
const EMPTY_FIELDS: &str = "❌ Keywords and reply must not be empty.";
const RULE_SAVED: &str = "✅ Rule saved (formatting preserved).";
const DEL_USAGE: &str = "❌ Wrong format. Use: /del keyword";
const NO_RULES: &str = "❌ This group has no rules yet.";
const COOLDOWN_NOTICE: &str = "❌ Not so fast, please wait a few seconds.";
const GROUP_HINT: &str = "Add this bot to a group to manage auto-replies there.";

const START_TEXT: &str = "👋 Welcome to the keyword auto-reply bot!

Commands:
/add keyword1||keyword2===reply text - add a rule (one reply per rule, formatting preserved)
/del keyword - remove a keyword
/list - show this group's rules
/help - show help
";

const HELP_TEXT: &str = "💡 Help:

✅ Add a rule (one reply per rule):
/add install===`install all`
/add hello||hi===Welcome!

✅ Remove a keyword:
/del install

✅ Show rules:
/list

Notes:
- Only administrators can manage rules.
- Replies keep the formatting you typed (code, bold, links).
";

/// One flattened inbound message, everything the responder needs to act.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub chat_id: i64,
    pub user_id: i64,
    pub message_id: i64,
    pub text: String,
    /// Formatting of the whole message, in message coordinates.
    pub spans: Vec<span::FormattingSpan>,
    pub is_private: bool,
    pub from_bot: bool,
}

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Our own username, for `/command@bot` targeting. `None` until known.
    pub bot_username: Option<String>,
    /// Users allowed to manage rules everywhere, on top of per-group admins.
    pub admin_ids: HashSet<i64>,
    pub cooldown: Duration,
    /// Lifetime of keyword auto-replies.
    pub reply_ttl: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            bot_username: None,
            admin_ids: HashSet::new(),
            cooldown: Duration::from_millis(5000),
            reply_ttl: Duration::from_secs(20),
        }
    }
}

pub struct Responder {
    config: ResponderConfig,
    rules: RuleStore,
    cooldown: CooldownGate,
    ephemeral: EphemeralSender,
    api: Arc<dyn ChatApi>,
}

impl Responder {
    pub fn new(
        config: ResponderConfig,
        kv: Arc<dyn KvStore>,
        api: Arc<dyn ChatApi>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            rules: RuleStore::new(kv.clone()),
            cooldown: CooldownGate::new(kv, config.cooldown),
            ephemeral: EphemeralSender::new(api.clone(), scheduler),
            api,
            config,
        }
    }

    /// Entry point for every inbound message. Never errors: anything that
    /// goes wrong downstream is logged and absorbed.
    pub async fn handle(&self, msg: Incoming) {
        if msg.from_bot {
            return;
        }

        match command::route(&msg.text, self.config.bot_username.as_deref()) {
            Route::NotForUs => {}
            Route::Plain => self.auto_reply(&msg).await,
            Route::Unknown => {
                if self.check_admin_gate(&msg).await {
                    self.notify(msg.chat_id, UNKNOWN_COMMAND, ERROR_TTL, Some(trigger(&msg)))
                        .await;
                }
            }
            Route::Command(cmd) => {
                // /start and /help stay open to everyone.
                if !matches!(cmd, Command::Start | Command::Help)
                    && !self.check_admin_gate(&msg).await
                {
                    return;
                }
                match cmd {
                    Command::Add => self.cmd_add(&msg).await,
                    Command::Del => self.cmd_del(&msg).await,
                    Command::List => self.cmd_list(&msg).await,
                    Command::ListAll => self.cmd_list_all(&msg).await,
                    Command::Admin => self.cmd_admin(&msg).await,
                    Command::Start => self.cmd_start(&msg).await,
                    Command::Help => self.cmd_help(&msg).await,
                }
            }
        }
    }

    /// True when the sender may manage rules; refuses them otherwise.
    async fn check_admin_gate(&self, msg: &Incoming) -> bool {
        if self.is_admin(msg).await {
            return true;
        }
        debug!("denied command from user {} in chat {}", msg.user_id, msg.chat_id);
        self.notify(msg.chat_id, NOT_ALLOWED, NOTICE_TTL, Some(trigger(msg)))
            .await;
        false
    }

    /// Configured admins qualify everywhere. In groups the live administrator
    /// list decides; in a private chat there are no group admins, so anyone
    /// else gets pointed at group usage instead.
    async fn is_admin(&self, msg: &Incoming) -> bool {
        if self.config.admin_ids.contains(&msg.user_id) {
            return true;
        }
        if msg.is_private {
            self.ephemeral
                .send_and_keep(msg.chat_id, &ReplyContent::plain(GROUP_HINT), None)
                .await;
            return false;
        }
        match self.api.chat_admins(msg.chat_id).await {
            Ok(admins) => admins.contains(&msg.user_id),
            Err(e) => {
                warn!("admin lookup failed for chat {}: {e}", msg.chat_id);
                false
            }
        }
    }

    async fn cmd_add(&self, msg: &Incoming) {
        let Some(args) = command::parse_add(&msg.text) else {
            self.notify(msg.chat_id, ADD_USAGE, ADD_USAGE_TTL, Some(trigger(msg)))
                .await;
            return;
        };

        let formatting = span::rebase(&msg.spans, args.reply_start);
        let reply = ReplyContent {
            text: args.reply_text,
            formatting,
        };
        match self
            .rules
            .upsert_rule(msg.chat_id, &args.raw_keywords, reply)
            .await
        {
            Ok(()) => {
                info!("✅ rule saved in chat {}", msg.chat_id);
                self.notify(msg.chat_id, RULE_SAVED, CONFIRM_TTL, Some(trigger(msg)))
                    .await;
            }
            Err(RuleError::Validation(_)) => {
                self.notify(msg.chat_id, EMPTY_FIELDS, ERROR_TTL, Some(trigger(msg)))
                    .await;
            }
            Err(e) => error!("rule save failed in chat {}: {e}", msg.chat_id),
        }
    }

    async fn cmd_del(&self, msg: &Incoming) {
        let Some(keyword) = command::parse_del(&msg.text) else {
            self.notify(msg.chat_id, DEL_USAGE, ERROR_TTL, Some(trigger(msg)))
                .await;
            return;
        };

        match self.rules.delete_keyword(msg.chat_id, &keyword).await {
            Ok(()) => {
                info!("🗑️ keyword '{keyword}' removed from chat {}", msg.chat_id);
                self.notify(
                    msg.chat_id,
                    &format!("✅ Removed keyword: {keyword}"),
                    CONFIRM_TTL,
                    Some(trigger(msg)),
                )
                .await;
            }
            Err(RuleError::NotFound(_)) => {
                self.notify(
                    msg.chat_id,
                    &format!("❌ Keyword not found: {keyword}"),
                    ERROR_TTL,
                    Some(trigger(msg)),
                )
                .await;
            }
            Err(e) => error!("keyword removal failed in chat {}: {e}", msg.chat_id),
        }
    }

    async fn cmd_list(&self, msg: &Incoming) {
        let rules = self.rules.load_rules(msg.chat_id).await;
        if rules.is_empty() {
            self.notify(msg.chat_id, NO_RULES, NOTICE_TTL, Some(trigger(msg)))
                .await;
            return;
        }
        self.notify(msg.chat_id, &render_rules(&rules), LIST_TTL, Some(trigger(msg)))
            .await;
    }

    /// Cross-chat overview, reserved for a private chat with the bot. The
    /// trigger survives in the refusal case; there is nothing worth hiding.
    async fn cmd_list_all(&self, msg: &Incoming) {
        if !msg.is_private {
            self.notify(msg.chat_id, NOT_ALLOWED, ERROR_TTL, None).await;
            return;
        }
        let chats = self.rules.list_all_chats().await;
        self.notify(
            msg.chat_id,
            &render_overview(&chats),
            OVERVIEW_TTL,
            Some(trigger(msg)),
        )
        .await;
    }

    async fn cmd_admin(&self, msg: &Incoming) {
        if msg.is_private {
            self.ephemeral
                .send_and_keep(msg.chat_id, &ReplyContent::plain(GROUP_HINT), None)
                .await;
            return;
        }
        let admins = match self.api.chat_admins(msg.chat_id).await {
            Ok(admins) => admins,
            Err(e) => {
                warn!("admin lookup failed for chat {}: {e}", msg.chat_id);
                Vec::new()
            }
        };
        self.notify(
            msg.chat_id,
            &render_admins(&admins),
            ADMIN_LIST_TTL,
            Some(trigger(msg)),
        )
        .await;
    }

    async fn cmd_start(&self, msg: &Incoming) {
        self.send_welcome(msg, START_TEXT, START_TTL).await;
    }

    async fn cmd_help(&self, msg: &Incoming) {
        self.send_welcome(msg, HELP_TEXT, HELP_TTL).await;
    }

    /// The open commands clean up the trigger everywhere but let their answer
    /// stand in a private chat, where nobody minds the clutter.
    async fn send_welcome(&self, msg: &Incoming, text: &str, ttl: Duration) {
        self.ephemeral.schedule_delete(trigger(msg));
        let content = ReplyContent::plain(text);
        if msg.is_private {
            self.ephemeral.send_and_keep(msg.chat_id, &content, None).await;
        } else {
            self.ephemeral
                .send_ephemeral(msg.chat_id, &content, ttl, None)
                .await;
        }
    }

    /// Ordinary text: gate on the cooldown first (a miss still stamps), then
    /// probe the chat's rules.
    async fn auto_reply(&self, msg: &Incoming) {
        if self.cooldown.check_and_stamp(msg.chat_id, msg.user_id).await {
            debug!("cooldown active for user {} in chat {}", msg.user_id, msg.chat_id);
            self.notify(msg.chat_id, COOLDOWN_NOTICE, NOTICE_TTL, Some(trigger(msg)))
                .await;
            return;
        }

        let rules = self.rules.load_rules(msg.chat_id).await;
        let Some(hit) = matcher::find_match(&rules, &msg.text) else {
            return;
        };

        info!("💬 keyword '{}' matched in chat {}", hit.keyword, msg.chat_id);
        self.ephemeral
            .send_ephemeral(
                msg.chat_id,
                &hit.rule.reply,
                self.config.reply_ttl,
                Some(trigger(msg)),
            )
            .await;
    }

    async fn notify(
        &self,
        chat_id: i64,
        text: &str,
        ttl: Duration,
        also_delete: Option<DeleteAfter>,
    ) {
        self.ephemeral
            .send_ephemeral(chat_id, &ReplyContent::plain(text), ttl, also_delete)
            .await;
    }
}

fn trigger(msg: &Incoming) -> DeleteAfter {
    DeleteAfter {
        chat_id: msg.chat_id,
        message_id: msg.message_id,
        ttl: TRIGGER_TTL,
    }
}

fn render_rules(rules: &[Rule]) -> String {
    let mut out = String::from("📋 Rules in this group:\n");
    for (i, rule) in rules.iter().enumerate() {
        out.push_str(&format!("\n🔹 Rule {}\n", i + 1));
        for keyword in &rule.keywords {
            out.push_str(&format!("  keyword: {keyword}\n"));
        }
        if !rule.reply.text.is_empty() {
            out.push_str(&format!("  reply: {}\n", rule.reply.text));
        }
    }
    out
}

fn render_overview(chats: &[(i64, Vec<Rule>)]) -> String {
    let mut out = String::from("📋 Rules across all chats:\n");
    for (chat_id, rules) in chats {
        if rules.is_empty() {
            continue;
        }
        out.push_str(&format!("\nChat {chat_id}\n"));
        for (i, rule) in rules.iter().enumerate() {
            out.push_str(&format!("Rule {}:\n", i + 1));
            for keyword in &rule.keywords {
                out.push_str(&format!(" keyword: {keyword}\n"));
            }
            if !rule.reply.text.is_empty() {
                out.push_str(&format!(" reply: {}\n", rule.reply.text));
            }
        }
    }
    out
}

fn render_admins(admin_ids: &[i64]) -> String {
    let mut out = String::from("👑 Administrators of this group:\n");
    if admin_ids.is_empty() {
        out.push_str("(none)\n");
    } else {
        for id in admin_ids {
            out.push_str(&format!("🔹 Admin ID: {id}\n"));
        }
    }
    out
}
