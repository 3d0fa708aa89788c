use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_GATEWAY_URL: &str = "https://ai-gateway.vercel.sh/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-haiku-4.5";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gateway: GatewayConfig,
    /// `None` disables mirroring on the server side.
    pub telegram: Option<TelegramConfig>,
    /// Where the terminal widget finds the server routes.
    pub server_url: String,
    /// Backing file for the terminal widget's local storage.
    pub db_path: PathBuf,
}

impl Config {
    /// Reads configuration from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("IRBOT_PORT") {
            Some(p) => p.parse().with_context(|| format!("Invalid IRBOT_PORT: {}", p))?,
            None => DEFAULT_PORT,
        };

        let gateway = GatewayConfig {
            base_url: var("AI_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            api_key: var("AI_GATEWAY_API_KEY"),
            model: var("AI_GATEWAY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        let token = var("TELEGRAM_BOT_TOKEN").or_else(|| var("TELOXIDE_TOKEN"));
        let telegram = match (token, var("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                token,
                chat_id: chat_id
                    .parse()
                    .with_context(|| format!("Invalid TELEGRAM_CHAT_ID: {}", chat_id))?,
            }),
            _ => None,
        };

        let db_path = match var("IRBOT_DB") {
            Some(path) => PathBuf::from(path),
            None => {
                let home = var("HOME").unwrap_or_else(|| ".".into());
                PathBuf::from(home).join(".irbot").join("widget.db")
            }
        };

        Ok(Self {
            port,
            gateway,
            telegram,
            server_url: var("IRBOT_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            db_path,
        })
    }
}
