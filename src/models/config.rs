//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ProductId;

/// Environment variable holding the bot token.
pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
/// Environment variable holding the destination chat id.
pub const ENV_CHAT_ID: &str = "CHAT_ID";
/// Environment variable holding the watched product id.
pub const ENV_PRODUCT_ID: &str = "PRODUCT_ID";

/// Longest accepted `getUpdates` long-poll.
pub const MAX_POLL_TIMEOUT_SECS: u64 = 600;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Which product page to watch
    #[serde(default)]
    pub target: TargetConfig,

    /// Scheduler timing
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Retry behavior around a single probe
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// How product pages are rendered
    #[serde(default)]
    pub render: RenderConfig,

    /// Page structure the prober looks for
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Outbound messaging channel
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Message templates
    #[serde(default)]
    pub messages: Messages,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Override identity and secrets from environment-style lookups.
    ///
    /// `lookup` returns the value of a variable, if set and non-empty.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = lookup(ENV_TELEGRAM_TOKEN) {
            self.telegram.token = token;
        }
        if let Some(raw) = lookup(ENV_CHAT_ID) {
            let chat_id = raw.trim().parse::<i64>().map_err(|_| {
                AppError::config(format!("{ENV_CHAT_ID} must be a number, got '{raw}'"))
            })?;
            self.telegram.chat_id = Some(chat_id);
        }
        if let Some(product_id) = lookup(ENV_PRODUCT_ID) {
            self.target.product_id = product_id.trim().to_string();
        }
        Ok(())
    }

    /// Override from the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Validate the parts needed to probe the product page.
    pub fn validate_probe(&self) -> Result<()> {
        if self.target.product_id.trim().is_empty() {
            return Err(AppError::config(format!(
                "target.product_id is empty (set {ENV_PRODUCT_ID})"
            )));
        }
        if !self.target.url_template.contains("{product_id}") {
            return Err(AppError::config(
                "target.url_template must contain {product_id}",
            ));
        }
        url::Url::parse(&self.product_url())
            .map_err(|e| AppError::config(format!("target.url_template is not a URL: {e}")))?;
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }
        if self.monitor.render_timeout_secs == 0 {
            return Err(AppError::config("monitor.render_timeout_secs must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::config("retry.max_attempts must be >= 1"));
        }
        self.selectors.validate()
    }

    /// Validate everything needed to run the monitor with notifications.
    pub fn validate(&self) -> Result<()> {
        self.validate_probe()?;
        if self.telegram.token.trim().is_empty() {
            return Err(AppError::config(format!(
                "telegram.token is empty (set {ENV_TELEGRAM_TOKEN})"
            )));
        }
        if self.telegram.chat_id.is_none() {
            return Err(AppError::config(format!(
                "telegram.chat_id is missing (set {ENV_CHAT_ID})"
            )));
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(AppError::config("monitor.poll_interval_secs must be > 0"));
        }
        if self.telegram.commands_enabled
            && !(1..=MAX_POLL_TIMEOUT_SECS).contains(&self.telegram.poll_timeout_secs)
        {
            return Err(AppError::config(format!(
                "telegram.poll_timeout_secs must be between 1 and {MAX_POLL_TIMEOUT_SECS}"
            )));
        }
        url::Url::parse(&self.telegram.api_base)
            .map_err(|e| AppError::config(format!("telegram.api_base is not a URL: {e}")))?;
        Ok(())
    }

    pub fn product_id(&self) -> ProductId {
        ProductId::new(self.target.product_id.trim())
    }

    pub fn product_url(&self) -> String {
        self.product_id().url(&self.target.url_template)
    }
}

/// The watched product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Product identifier substituted into the URL template
    #[serde(default)]
    pub product_id: String,

    /// Human-readable name used in notifications
    #[serde(default = "defaults::product_name")]
    pub product_name: String,

    /// Product page URL with a `{product_id}` placeholder
    #[serde(default = "defaults::url_template")]
    pub url_template: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            product_id: String::new(),
            product_name: defaults::product_name(),
            url_template: defaults::url_template(),
        }
    }
}

/// Scheduler timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay before the first check
    #[serde(default = "defaults::initial_delay")]
    pub initial_delay_secs: u64,

    /// Delay between the end of one check and the start of the next
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound on rendering one page
    #[serde(default = "defaults::render_timeout")]
    pub render_timeout_secs: u64,
}

impl MonitorConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: defaults::initial_delay(),
            poll_interval_secs: defaults::poll_interval(),
            render_timeout_secs: defaults::render_timeout(),
        }
    }
}

/// Retry settings for a single probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts in seconds
    #[serde(default = "defaults::retry_delay")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            delay_secs: defaults::retry_delay(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
        }
    }
}

/// Page rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderEngine {
    /// Headless Chromium, runs the page's scripts
    #[default]
    Chromium,
    /// Plain HTTP fetch of the served HTML
    Static,
}

/// Rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub engine: RenderEngine,

    /// Chromium binary; detected from the usual install paths when unset
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Pass `--no-sandbox` to Chromium (needed as root in containers)
    #[serde(default)]
    pub no_sandbox: bool,

    /// Extra wait after the network went quiet, for late client-side updates
    #[serde(default = "defaults::settle_ms")]
    pub settle_ms: u64,
}

impl RenderConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            engine: RenderEngine::default(),
            executable: None,
            no_sandbox: false,
            settle_ms: defaults::settle_ms(),
        }
    }
}

/// CSS selectors and text markers describing the purchase controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// The main "add to cart" button
    #[serde(default = "defaults::primary_action")]
    pub primary_action: String,

    /// Size/variant containers, tried in order
    #[serde(default = "defaults::variant_containers")]
    pub variant_containers: Vec<String>,

    /// Variant buttons inside a container
    #[serde(default = "defaults::variant_control")]
    pub variant_control: String,

    /// Button text meaning the item is sold out (case-sensitive)
    #[serde(default = "defaults::out_of_stock_markers")]
    pub out_of_stock_markers: Vec<String>,

    /// Button text meaning a variant must be picked first (case-sensitive)
    #[serde(default = "defaults::variant_prompt_markers")]
    pub variant_prompt_markers: Vec<String>,
}

impl SelectorConfig {
    /// Check that every selector parses.
    pub fn validate(&self) -> Result<()> {
        if self.variant_containers.is_empty() {
            return Err(AppError::config("selectors.variant_containers is empty"));
        }
        let all = std::iter::once(&self.primary_action)
            .chain(self.variant_containers.iter())
            .chain(std::iter::once(&self.variant_control));
        for selector in all {
            Selector::parse(selector).map_err(|e| {
                AppError::config(format!("Invalid selector '{selector}': {e:?}"))
            })?;
        }
        Ok(())
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            primary_action: defaults::primary_action(),
            variant_containers: defaults::variant_containers(),
            variant_control: defaults::variant_control(),
            out_of_stock_markers: defaults::out_of_stock_markers(),
            variant_prompt_markers: defaults::variant_prompt_markers(),
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token (usually taken from `TELEGRAM_TOKEN`)
    #[serde(default)]
    pub token: String,

    /// Destination chat (usually taken from `CHAT_ID`)
    #[serde(default)]
    pub chat_id: Option<i64>,

    /// Bot API base URL
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Formatting mode passed to `sendMessage`
    #[serde(default = "defaults::parse_mode")]
    pub parse_mode: String,

    /// Send a banner to the destination when the monitor starts
    #[serde(default = "defaults::enabled")]
    pub announce_startup: bool,

    /// Answer `/start` and `/status` commands
    #[serde(default = "defaults::enabled")]
    pub commands_enabled: bool,

    /// Long-poll timeout for `getUpdates`
    #[serde(default = "defaults::poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: None,
            api_base: defaults::api_base(),
            parse_mode: defaults::parse_mode(),
            announce_startup: defaults::enabled(),
            commands_enabled: defaults::enabled(),
            poll_timeout_secs: defaults::poll_timeout(),
        }
    }
}

/// Message templates.
///
/// Placeholders: `{product_id}`, `{product_name}`, `{url}`, `{detected_at}`,
/// `{checked_at}`, `{result}`, `{now}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default = "defaults::msg_available")]
    pub available: String,
    #[serde(default = "defaults::msg_startup")]
    pub startup: String,
    #[serde(default = "defaults::msg_greeting")]
    pub greeting: String,
    #[serde(default = "defaults::msg_status")]
    pub status: String,
    #[serde(default = "defaults::msg_status_pending")]
    pub status_pending: String,
    #[serde(default = "defaults::msg_result_available")]
    pub result_available: String,
    #[serde(default = "defaults::msg_result_unavailable")]
    pub result_unavailable: String,
    #[serde(default = "defaults::msg_result_unknown")]
    pub result_unknown: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            available: defaults::msg_available(),
            startup: defaults::msg_startup(),
            greeting: defaults::msg_greeting(),
            status: defaults::msg_status(),
            status_pending: defaults::msg_status_pending(),
            result_available: defaults::msg_result_available(),
            result_unavailable: defaults::msg_result_unavailable(),
            result_unknown: defaults::msg_result_unknown(),
        }
    }
}

mod defaults {
    // Target defaults
    pub fn product_name() -> String {
        "Team Spirit Hoodie".into()
    }
    pub fn url_template() -> String {
        "https://shop.teamspirit.gg/ru/products/{product_id}".into()
    }

    // Monitor defaults
    pub fn initial_delay() -> u64 {
        10
    }
    pub fn poll_interval() -> u64 {
        600
    }
    pub fn render_timeout() -> u64 {
        30
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        30
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; stockwatch/0.1)".into()
    }

    // Render defaults
    pub fn settle_ms() -> u64 {
        2000
    }

    // Selector defaults
    pub fn primary_action() -> String {
        "button.btn-lg".into()
    }
    pub fn variant_containers() -> Vec<String> {
        vec![
            "div.purchase-card__sizes".into(),
            r#"div[role="group"]"#.into(),
        ]
    }
    pub fn variant_control() -> String {
        "button".into()
    }
    pub fn out_of_stock_markers() -> Vec<String> {
        vec![
            "Нет в наличии".into(),
            "Not available".into(),
            "Out of stock".into(),
        ]
    }
    pub fn variant_prompt_markers() -> Vec<String> {
        vec!["Выберите размер".into(), "Select size".into()]
    }

    // Telegram defaults
    pub fn api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn parse_mode() -> String {
        "Markdown".into()
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn poll_timeout() -> u64 {
        30
    }

    // Message defaults
    pub fn msg_available() -> String {
        "🎉 *IN STOCK!*\n🏆 {product_name}\n🆔 ID: {product_id}\n🔗 [Link]({url})\n🕒 Detected: {detected_at}".into()
    }
    pub fn msg_startup() -> String {
        "🔄 Monitor restarted\n📦 ID: {product_id}\n🕒 {now}".into()
    }
    pub fn msg_greeting() -> String {
        "🚀 Stock monitor is running!".into()
    }
    pub fn msg_status() -> String {
        "📊 *Monitoring status*\n📦 ID: `{product_id}`\n🔍 Last check: {checked_at}\n📈 Result: {result}\n🕗 Now: {now}".into()
    }
    pub fn msg_status_pending() -> String {
        "🕗 Monitoring has not started yet.".into()
    }
    pub fn msg_result_available() -> String {
        "✅ Available".into()
    }
    pub fn msg_result_unavailable() -> String {
        "❌ Unavailable".into()
    }
    pub fn msg_result_unknown() -> String {
        "⚠️ Check failed".into()
    }
}
