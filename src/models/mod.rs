// src/models/mod.rs

//! Domain models for the stock watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod availability;
mod config;
mod status;

// Re-export all public types
pub use availability::{AvailabilityState, CheckOutcome, ProductId};
pub use config::{
    Config, HttpConfig, Messages, MonitorConfig, RenderConfig, RenderEngine, RetryConfig,
    SelectorConfig, TargetConfig, TelegramConfig, ENV_CHAT_ID, ENV_PRODUCT_ID,
    ENV_TELEGRAM_TOKEN, MAX_POLL_TIMEOUT_SECS,
};
pub use status::{format_local, GateState, MonitorStatus, TIMESTAMP_FORMAT};
