//! Cooperative cancellation.
//!
//! A [`ShutdownTrigger`] flips a `watch` flag; every [`Shutdown`] clone
//! observes it between ticks and during waits.

use std::time::Duration;

use tokio::sync::watch;

use crate::utils::clock::Clock;

/// Create a connected trigger/listener pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Sending half; call [`ShutdownTrigger::trigger`] to stop the monitor.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no listeners left.
        self.tx.send_replace(true);
    }
}

/// Listening half.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    ///
    /// A dropped trigger never resolves: nobody is left to ask for a stop.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep on `clock` unless shutdown arrives first.
    ///
    /// Returns `true` when the full duration elapsed and no shutdown was
    /// requested in the meantime.
    pub async fn sleep(&mut self, clock: &dyn Clock, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.triggered() => {}
            _ = clock.sleep(duration) => {}
        }

        !self.is_triggered()
    }
}
