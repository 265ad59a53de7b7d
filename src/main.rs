mod config;
mod responder;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use config::Config;
use responder::{
    Incoming, Responder, ResponderConfig, Scheduler, SqliteKv, TelegramSender, span,
};

struct BotState {
    responder: Responder,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "keyparrot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("keyparrot.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting keyparrot...");
    info!("Loaded config from {config_path}");

    // Without a known username, commands addressed as /cmd@botname are
    // treated as meant for some other bot.
    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            Some(me.username().to_string())
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}");
            None
        }
    };

    let db_path = config.data_dir.join("rules.db");
    let kv = match SqliteKv::open(&db_path) {
        Ok(kv) => Arc::new(kv),
        Err(e) => {
            tracing::error!("failed to open rule store at '{}': {e}", db_path.display());
            std::process::exit(1);
        }
    };

    let scheduler = Scheduler::new();
    let responder = Responder::new(
        ResponderConfig {
            bot_username,
            admin_ids: config.admin_ids.clone(),
            cooldown: config.cooldown,
            reply_ttl: config.reply_ttl,
        },
        kv,
        Arc::new(TelegramSender::new(bot.clone())),
        scheduler.clone(),
    );
    let state = Arc::new(BotState { responder });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_new_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Draining scheduled deletions...");
    scheduler.shutdown().await;
}

async fn handle_new_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(incoming) = flatten_message(&msg) else {
        return Ok(());
    };

    let preview: String = incoming.text.chars().take(100).collect();
    info!(
        "📨 Message from {} in chat {}: \"{preview}\"",
        incoming.user_id, incoming.chat_id
    );

    state.responder.handle(incoming).await;
    Ok(())
}

/// Skips messages without a sender or text; the responder only ever acts on
/// plain text.
fn flatten_message(msg: &Message) -> Option<Incoming> {
    let user = msg.from.as_ref()?;
    let text = msg.text()?;
    Some(Incoming {
        chat_id: msg.chat.id.0,
        user_id: user.id.0 as i64,
        message_id: msg.id.0 as i64,
        text: text.to_string(),
        spans: msg.entities().map(span::from_entities).unwrap_or_default(),
        is_private: matches!(msg.chat.kind, ChatKind::Private(_)),
        from_bot: user.is_bot,
    })
}
