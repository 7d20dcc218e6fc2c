//! Service layer for the stock watcher.
//!
//! This module contains the collaborators of the monitor:
//! - Page rendering and querying (`PageInspector`, `ChromiumInspector`)
//! - Availability decision (`AvailabilityProber`)
//! - Outbound notifications (`Notifier`, `TelegramNotifier`)
//! - Telegram Bot API access (`TelegramBot`)

mod browser;
pub mod inspector;
mod notifier;
mod prober;
pub mod telegram;

pub use browser::ChromiumInspector;
pub use inspector::{
    live_inspector, Document, Element, HttpInspector, InMemoryInspector, PageInspector,
    ScriptedPage,
};
pub use notifier::{Notifier, TelegramNotifier};
pub use prober::AvailabilityProber;
pub use telegram::{BotCommand, TelegramBot, Update};
