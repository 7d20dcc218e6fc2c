//! Notification gate.
//!
//! Sends one notification per run of `Available` outcomes.
//!
//! ```text
//!            Available / notify
//!   Idle ───────────────────────▶ Armed ──┐ Available / suppress
//!    ▲                              │  ◀──┘
//!    └──────── Unavailable ─────────┘
//! ```
//!
//! `Unknown` never changes the state: an inconclusive check neither
//! confirms availability nor clears it.

use crate::models::{AvailabilityState, GateState};

/// Result of feeding one outcome to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// First `Available` after a lapse: send a notification
    Notify,
    /// Still available, already notified
    Suppressed,
    /// Unavailable: ready to notify again
    Rearmed,
    /// Inconclusive outcome: nothing changes
    Unchanged,
}

impl GateDecision {
    pub fn should_notify(&self) -> bool {
        matches!(self, GateDecision::Notify)
    }
}

/// Two-state dedup machine in front of the notifier.
#[derive(Debug, Clone, Default)]
pub struct NotificationGate {
    state: GateState,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// What `record` would decide for `outcome`, without changing state.
    pub fn check(&self, outcome: AvailabilityState) -> (GateDecision, GateState) {
        match (self.state, outcome) {
            (GateState::Idle, AvailabilityState::Available) => {
                (GateDecision::Notify, GateState::Armed)
            }
            (GateState::Armed, AvailabilityState::Available) => {
                (GateDecision::Suppressed, GateState::Armed)
            }
            (_, AvailabilityState::Unavailable) => (GateDecision::Rearmed, GateState::Idle),
            (state, AvailabilityState::Unknown) => (GateDecision::Unchanged, state),
        }
    }

    /// Apply `outcome` and return the decision.
    pub fn record(&mut self, outcome: AvailabilityState) -> GateDecision {
        let (decision, next) = self.check(outcome);

        match decision {
            GateDecision::Notify => {
                log::info!("Gate: {:?} → {:?}, notification due", self.state, next)
            }
            GateDecision::Suppressed => {
                log::info!("Gate: still available, notification already sent")
            }
            GateDecision::Rearmed if self.state != next => {
                log::info!("Gate: availability lapsed, re-armed")
            }
            GateDecision::Rearmed => log::debug!("Gate: unavailable, stays idle"),
            GateDecision::Unchanged => {
                log::debug!("Gate: inconclusive check, stays {:?}", self.state)
            }
        }

        self.state = next;
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AvailabilityState::{Available, Unavailable, Unknown};

    fn notifications(outcomes: &[AvailabilityState]) -> usize {
        let mut gate = NotificationGate::new();
        outcomes
            .iter()
            .filter(|o| gate.record(**o).should_notify())
            .count()
    }

    #[test]
    fn test_starts_idle() {
        assert_eq!(NotificationGate::new().state(), GateState::Idle);
    }

    #[test]
    fn test_run_of_available_notifies_once() {
        assert_eq!(notifications(&[Available, Available, Available]), 1);
    }

    #[test]
    fn test_lapse_rearms() {
        assert_eq!(notifications(&[Available, Unavailable, Available]), 2);
    }

    #[test]
    fn test_unknown_does_not_suppress_later_available() {
        assert_eq!(notifications(&[Unknown, Available]), 1);
    }

    #[test]
    fn test_unknown_does_not_rearm() {
        assert_eq!(notifications(&[Available, Unknown, Available]), 1);
    }

    #[test]
    fn test_first_notification_is_on_first_available() {
        let mut gate = NotificationGate::new();
        assert_eq!(gate.record(Unavailable), GateDecision::Rearmed);
        assert_eq!(gate.record(Available), GateDecision::Notify);
        assert_eq!(gate.state(), GateState::Armed);
        assert_eq!(gate.record(Available), GateDecision::Suppressed);
    }

    #[test]
    fn test_check_does_not_mutate() {
        let gate = NotificationGate::new();
        assert_eq!(gate.check(Available), (GateDecision::Notify, GateState::Armed));
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn test_every_transition() {
        let cases = [
            (GateState::Idle, Available, GateDecision::Notify, GateState::Armed),
            (GateState::Armed, Available, GateDecision::Suppressed, GateState::Armed),
            (GateState::Idle, Unavailable, GateDecision::Rearmed, GateState::Idle),
            (GateState::Armed, Unavailable, GateDecision::Rearmed, GateState::Idle),
            (GateState::Idle, Unknown, GateDecision::Unchanged, GateState::Idle),
            (GateState::Armed, Unknown, GateDecision::Unchanged, GateState::Armed),
        ];
        for (from, outcome, decision, to) in cases {
            let mut gate = NotificationGate { state: from };
            assert_eq!(gate.record(outcome), decision, "{from:?} + {outcome:?}");
            assert_eq!(gate.state(), to, "{from:?} + {outcome:?}");
        }
    }
}
