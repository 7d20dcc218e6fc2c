//! Read-only monitoring snapshot.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AvailabilityState, CheckOutcome, Messages, ProductId};

/// Display format for timestamps in messages.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Notification gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// The next `Available` outcome sends a notification.
    #[default]
    Idle,
    /// A notification went out for the current run of `Available` outcomes.
    Armed,
}

/// What the scheduler knows after its latest tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub last_outcome: Option<CheckOutcome>,
    pub gate: GateState,
    pub ticks: u64,
    pub notifications_sent: u64,
    pub delivery_failures: u64,
}

impl MonitorStatus {
    /// Render the `/status` reply.
    pub fn render(
        &self,
        messages: &Messages,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> String {
        let Some(outcome) = self.last_outcome else {
            return messages.status_pending.clone();
        };

        let result = match outcome.state {
            AvailabilityState::Available => &messages.result_available,
            AvailabilityState::Unavailable => &messages.result_unavailable,
            AvailabilityState::Unknown => &messages.result_unknown,
        };

        messages
            .status
            .replace("{product_id}", product_id.as_str())
            .replace("{checked_at}", &format_local(outcome.observed_at))
            .replace("{result}", result)
            .replace("{now}", &format_local(now))
    }
}

/// Format a timestamp in local time for humans.
pub fn format_local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_render_before_first_check() {
        let status = MonitorStatus::default();
        let messages = Messages::default();
        let text = status.render(&messages, &ProductId::new("555"), Utc::now());
        assert_eq!(text, messages.status_pending);
    }

    #[test]
    fn test_render_after_check() {
        let observed = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let status = MonitorStatus {
            last_outcome: Some(CheckOutcome::new(AvailabilityState::Unknown, observed)),
            ..MonitorStatus::default()
        };
        let messages = Messages::default();
        let text = status.render(&messages, &ProductId::new("555"), observed);

        assert!(text.contains("`555`"));
        assert!(text.contains(&messages.result_unknown));
        assert!(text.contains(&format_local(observed)));
    }
}
