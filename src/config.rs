use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Users who may manage rules in every chat, without being group admins.
    #[serde(default)]
    admin_ids: Vec<i64>,
    /// Directory for state files (rule database, logs). Defaults to current directory.
    data_dir: Option<String>,
    /// Per-user auto-reply cooldown in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    cooldown_ms: u64,
    /// How long auto-replies stay visible, in milliseconds.
    #[serde(default = "default_reply_ttl_ms")]
    reply_ttl_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_reply_ttl_ms() -> u64 {
    20_000
}

pub struct Config {
    pub telegram_bot_token: String,
    pub admin_ids: HashSet<i64>,
    /// Directory for state files (rule database, logs).
    pub data_dir: PathBuf,
    pub cooldown: Duration,
    pub reply_ttl: Duration,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        // Validate required fields
        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.reply_ttl_ms == 0 {
            return Err(ConfigError::Validation("reply_ttl_ms must be greater than zero".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            admin_ids: file.admin_ids.into_iter().collect(),
            data_dir,
            cooldown: Duration::from_millis(file.cooldown_ms),
            reply_ttl: Duration::from_millis(file.reply_ttl_ms),
        })
    }
}
