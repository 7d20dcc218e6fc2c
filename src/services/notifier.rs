//! Outbound notification channel.

use async_trait::async_trait;

use crate::error::Result;
use crate::services::telegram::TelegramBot;

/// Delivers text to a fixed destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text`; `Ok` means the channel accepted it.
    async fn send(&self, text: &str) -> Result<()>;
}

/// Sends notifications to one Telegram chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: TelegramBot,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(bot: TelegramBot, chat_id: i64) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.bot.send_message(self.chat_id, text).await
    }
}
