//! Utility functions and helpers.

pub mod clock;
pub mod http;
pub mod shutdown;

pub use clock::{Clock, SystemClock};
pub use shutdown::{Shutdown, ShutdownTrigger};

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
