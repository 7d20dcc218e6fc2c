// src/services/telegram.rs

//! Minimal Telegram Bot API client.
//!
//! Covers the three methods the watcher needs: `sendMessage`,
//! `getUpdates` and `setMyCommands`.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::TelegramConfig;

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// One entry of a `getUpdates` batch.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// A message sent to the bot.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Entry of the bot's command menu.
#[derive(Debug, Clone, Serialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct SetMyCommands<'a> {
    commands: &'a [BotCommand],
}

/// Bot API client bound to one token.
#[derive(Clone)]
pub struct TelegramBot {
    client: Client,
    api_base: String,
    token: String,
    parse_mode: String,
}

impl TelegramBot {
    pub fn new(client: Client, config: &TelegramConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            parse_mode: config.parse_mode.clone(),
        }
    }

    /// Send `text` to `chat_id` with the configured parse mode.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: Some(self.parse_mode.as_str()).filter(|m| !m.is_empty()),
        };
        let _: serde_json::Value = self.call("sendMessage", &body, None).await?;
        Ok(())
    }

    /// Long-poll for new updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        let deadline = long_poll_deadline(timeout_secs);
        self.call("getUpdates", &body, Some(deadline)).await
    }

    /// Replace the command menu shown by Telegram clients.
    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<()> {
        let _: bool = self
            .call("setMyCommands", &SetMyCommands { commands }, None)
            .await?;
        Ok(())
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.method_url(method)).json(body);
        request = request.timeout(timeout.unwrap_or(Duration::from_secs(30)));

        // Strip the URL from transport errors: it embeds the token.
        let response = request.send().await.map_err(|e| e.without_url())?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| e.without_url())?;

        let parsed: ApiResponse<T> = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::notify(format!("{method}: unreadable response (HTTP {status}): {e}"))
        })?;
        unwrap_response(method, parsed)
    }
}

/// HTTP deadline for a long poll; it has to outlive the server-side wait.
fn long_poll_deadline(timeout_secs: u64) -> Duration {
    Duration::from_secs(timeout_secs.saturating_add(10))
}

fn unwrap_response<T>(method: &str, response: ApiResponse<T>) -> Result<T> {
    if !response.ok {
        let reason = response
            .description
            .unwrap_or_else(|| "no description".to_string());
        return Err(AppError::notify(format!("{method}: {reason}")));
    }
    response
        .result
        .ok_or_else(|| AppError::notify(format!("{method}: response without result")))
}
