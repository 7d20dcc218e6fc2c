//! Monitoring pipeline.
//!
//! - `RetryPolicy`: bounded retries around one probe
//! - `NotificationGate`: one notification per run of availability
//! - `Scheduler`: the fixed-interval loop tying them together
//! - `CommandListener`: read-only bot commands beside the loop

pub mod commands;
pub mod gate;
pub mod retry;
pub mod scheduler;

pub use commands::{announce_startup, Command, CommandChannel, CommandListener};
pub use gate::{GateDecision, NotificationGate};
pub use retry::RetryPolicy;
pub use scheduler::{Scheduler, StatusHandle, TickReport};
