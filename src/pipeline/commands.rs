//! Bot command surface.
//!
//! Answers `/start` and `/status` from the scheduler's read-only status
//! snapshots. Runs beside the scheduler and never touches its state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{format_local, Messages, ProductId};
use crate::pipeline::scheduler::StatusHandle;
use crate::services::{BotCommand, Notifier, TelegramBot, Update};
use crate::utils::{Clock, Shutdown};

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
}

impl Command {
    /// Parse the first word of a message, accepting `/cmd@botname`.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" => Some(Command::Start),
            "status" => Some(Command::Status),
            _ => None,
        }
    }

    /// Menu entries registered with the bot.
    pub fn menu() -> Vec<BotCommand> {
        vec![
            BotCommand::new("start", "Start the bot"),
            BotCommand::new("status", "Show monitoring status"),
        ]
    }
}

/// Transport used by the command listener.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Publish the command menu.
    async fn register(&self, commands: &[BotCommand]) -> Result<()>;

    /// Wait up to `timeout_secs` for updates after `offset`.
    async fn poll(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>>;

    /// Answer in `chat_id`.
    async fn reply(&self, chat_id: i64, text: &str) -> Result<()>;
}

#[async_trait]
impl CommandChannel for TelegramBot {
    async fn register(&self, commands: &[BotCommand]) -> Result<()> {
        self.set_my_commands(commands).await
    }

    async fn poll(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        self.get_updates(offset, timeout_secs).await
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

/// Long-polls for commands and answers them.
pub struct CommandListener {
    channel: Arc<dyn CommandChannel>,
    status: StatusHandle,
    messages: Messages,
    product_id: ProductId,
    clock: Arc<dyn Clock>,
    poll_timeout_secs: u64,
}

impl CommandListener {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        status: StatusHandle,
        messages: Messages,
        product_id: ProductId,
        clock: Arc<dyn Clock>,
        poll_timeout_secs: u64,
    ) -> Self {
        Self {
            channel,
            status,
            messages,
            product_id,
            clock,
            poll_timeout_secs,
        }
    }

    /// Reply text for `command` given the current snapshot.
    pub fn reply_for(&self, command: Command) -> String {
        match command {
            Command::Start => self.messages.greeting.clone(),
            Command::Status => {
                self.status
                    .snapshot()
                    .render(&self.messages, &self.product_id, self.clock.now())
            }
        }
    }

    /// Serve commands until `shutdown` fires.
    pub async fn run(self, mut shutdown: Shutdown) {
        if let Err(e) = self.channel.register(&Command::menu()).await {
            log::warn!("Failed to register bot commands: {}", e);
        }

        let mut offset = None;
        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                polled = self.channel.poll(offset, self.poll_timeout_secs) => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.handle(update).await;
                    }
                }
                Err(e) => {
                    log::warn!("Polling for bot commands failed: {}", e);
                    if !shutdown.sleep(self.clock.as_ref(), POLL_ERROR_BACKOFF).await {
                        break;
                    }
                }
            }
        }

        log::info!("Command listener stopped");
    }

    async fn handle(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return;
        };

        log::info!("Command {:?} from chat {}", command, message.chat.id);
        let reply = self.reply_for(command);
        if let Err(e) = self.channel.reply(message.chat.id, &reply).await {
            log::warn!("Failed to answer {:?}: {}", command, e);
        }
    }
}

/// Send the "monitor restarted" banner. Failure is only logged.
pub async fn announce_startup(
    notifier: &dyn Notifier,
    messages: &Messages,
    product_id: &ProductId,
    clock: &dyn Clock,
) -> bool {
    let text = messages
        .startup
        .replace("{product_id}", product_id.as_str())
        .replace("{now}", &format_local(clock.now()));

    match notifier.send(&text).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Startup banner not delivered: {}", e);
            false
        }
    }
}
