use super::ThreadRelay;
use crate::config::TelegramConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::{
    payloads::SendMessageSetters,
    requests::Requester,
    types::{ChatId, MessageId},
    Bot,
};
use tracing::info;

/// Mirrors chat sessions into a Telegram chat. Each session is a reply chain
/// hanging off a "session started" message; its message id is the thread id.
#[derive(Clone)]
pub struct TelegramRelay {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramRelay {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        info!("Mirroring chat sessions to Telegram chat {}", config.chat_id);

        Ok(Self {
            bot: Bot::with_client(config.token.clone(), client),
            chat_id: ChatId(config.chat_id),
        })
    }
}

#[async_trait]
impl ThreadRelay for TelegramRelay {
    async fn open_thread(&self, title: &str, opening: &str) -> Result<String> {
        let text = format!("{}\n{}", title, opening);
        let root = self
            .bot
            .send_message(self.chat_id, text)
            .await
            .context("Failed to start Telegram thread")?;

        Ok(root.id.0.to_string())
    }

    async fn post(&self, thread_id: &str, text: &str) -> Result<()> {
        let root: i32 = thread_id
            .parse()
            .with_context(|| format!("Invalid thread id: {}", thread_id))?;

        self.bot
            .send_message(self.chat_id, text)
            .reply_to_message_id(MessageId(root))
            .await
            .context("Failed to post to Telegram thread")?;

        Ok(())
    }
}
