// src/pipeline/scheduler.rs

//! Fixed-interval monitoring loop.
//!
//! One task owns the whole cycle: wait, probe through the retry policy,
//! feed the gate, maybe notify, publish a status snapshot. The next wait
//! starts only after the current cycle, retries included, is done.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::models::{
    format_local, AvailabilityState, CheckOutcome, Config, GateState, Messages, MonitorStatus,
    ProductId,
};
use crate::pipeline::gate::{GateDecision, NotificationGate};
use crate::pipeline::retry::RetryPolicy;
use crate::services::{AvailabilityProber, Notifier};
use crate::utils::{Clock, Shutdown};

/// Read-only view of the scheduler's latest state.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<MonitorStatus>,
}

impl StatusHandle {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> MonitorStatus {
        self.rx.borrow().clone()
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: CheckOutcome,
    pub decision: GateDecision,
    /// `Some(true)` if a notification went out, `Some(false)` if it failed
    pub delivered: Option<bool>,
}

/// Drives periodic checks of one product.
pub struct Scheduler {
    product_id: ProductId,
    product_name: String,
    product_url: String,
    messages: Messages,
    initial_delay: Duration,
    poll_interval: Duration,
    prober: AvailabilityProber,
    retry: RetryPolicy,
    gate: NotificationGate,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    status: MonitorStatus,
    status_tx: watch::Sender<MonitorStatus>,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        prober: AvailabilityProber,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status_tx, _) = watch::channel(MonitorStatus::default());
        Self {
            product_id: config.product_id(),
            product_name: config.target.product_name.clone(),
            product_url: config.product_url(),
            messages: config.messages.clone(),
            initial_delay: config.monitor.initial_delay(),
            poll_interval: config.monitor.poll_interval(),
            prober,
            retry: RetryPolicy::from_config(&config.retry),
            gate: NotificationGate::new(),
            notifier,
            clock,
            status: MonitorStatus::default(),
            status_tx,
        }
    }

    /// Subscribe to status snapshots.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            rx: self.status_tx.subscribe(),
        }
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Run until `shutdown` fires; returns the final status.
    pub async fn run(mut self, mut shutdown: Shutdown) -> MonitorStatus {
        log::info!(
            "Monitoring {} every {}s (first check in {}s)",
            self.product_url,
            self.poll_interval.as_secs(),
            self.initial_delay.as_secs()
        );

        let clock = Arc::clone(&self.clock);
        if shutdown.sleep(clock.as_ref(), self.initial_delay).await {
            loop {
                self.tick(&mut shutdown).await;
                if !shutdown.sleep(clock.as_ref(), self.poll_interval).await {
                    break;
                }
            }
        }

        log::info!(
            "Monitor stopped after {} checks, {} notifications sent",
            self.status.ticks,
            self.status.notifications_sent
        );
        self.status
    }

    /// Perform one full check cycle.
    pub async fn tick(&mut self, shutdown: &mut Shutdown) -> TickReport {
        log::info!("{}", "─".repeat(40));
        log::info!("Automatic check of product {}", self.product_id);

        let prober = &self.prober;
        let product_id = &self.product_id;
        let state = self
            .retry
            .run(self.clock.as_ref(), shutdown, move |attempt| {
                log::debug!("Probe attempt {}", attempt);
                prober.probe(product_id)
            })
            .await;

        let outcome = CheckOutcome::new(state, self.clock.now());
        match state {
            AvailabilityState::Available => log::info!("Product is AVAILABLE"),
            AvailabilityState::Unavailable => log::info!("Product is not available"),
            AvailabilityState::Unknown => log::warn!("Availability unknown (network problem)"),
        }

        let decision = self.gate.record(state);
        let delivered = if decision.should_notify() {
            Some(self.notify(&outcome).await)
        } else {
            None
        };

        self.status.last_outcome = Some(outcome);
        self.status.gate = self.gate.state();
        self.status.ticks += 1;
        match delivered {
            Some(true) => self.status.notifications_sent += 1,
            Some(false) => self.status.delivery_failures += 1,
            None => {}
        }
        self.status_tx.send_replace(self.status.clone());

        TickReport {
            outcome,
            decision,
            delivered,
        }
    }

    /// Send the availability message. Failures are logged, not retried.
    async fn notify(&self, outcome: &CheckOutcome) -> bool {
        let text = self
            .messages
            .available
            .replace("{product_name}", &self.product_name)
            .replace("{product_id}", self.product_id.as_str())
            .replace("{url}", &self.product_url)
            .replace("{detected_at}", &format_local(outcome.observed_at));

        match self.notifier.send(&text).await {
            Ok(()) => {
                log::info!("Notification sent");
                true
            }
            Err(e) => {
                log::error!("Notification delivery failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{AppError, Result};
    use crate::services::{InMemoryInspector, ScriptedPage};
    use crate::utils::clock::ManualClock;
    use crate::utils::shutdown;

    const URL: &str = "https://shop.example/products/555";
    const IN_STOCK: &str = r#"<button class="btn-lg">В корзину</button>"#;
    const SOLD_OUT: &str = r#"<button class="btn-lg" disabled>Нет в наличии</button>"#;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                Err(AppError::notify("chat not found"))
            } else {
                Ok(())
            }
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.target.product_id = "555".to_string();
        config.target.url_template = "https://shop.example/products/{product_id}".to_string();
        config.retry.max_attempts = 2;
        config.retry.delay_secs = 30;
        config
    }

    fn scheduler(
        pages: Vec<ScriptedPage>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
    ) -> Scheduler {
        let config = config();
        let inspector = Arc::new(InMemoryInspector::new().script(URL, pages));
        let prober = AvailabilityProber::from_config(inspector, &config);
        Scheduler::new(&config, prober, notifier, clock)
    }

    fn html(page: &str) -> ScriptedPage {
        ScriptedPage::Html(page.to_string())
    }

    #[tokio::test]
    async fn test_available_streak_notifies_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new());
        let (_trigger, mut shutdown) = shutdown::channel();
        let mut scheduler = scheduler(
            vec![html(IN_STOCK), html(IN_STOCK), html(IN_STOCK)],
            Arc::clone(&notifier),
            clock,
        );

        let first = scheduler.tick(&mut shutdown).await;
        let second = scheduler.tick(&mut shutdown).await;
        let third = scheduler.tick(&mut shutdown).await;

        assert_eq!(first.decision, GateDecision::Notify);
        assert_eq!(first.delivered, Some(true));
        assert_eq!(second.decision, GateDecision::Suppressed);
        assert_eq!(third.delivered, None);
        assert_eq!(notifier.sent().len(), 1);
        assert!(notifier.sent()[0].contains("555"));
        assert!(notifier.sent()[0].contains(URL));
    }

    #[tokio::test]
    async fn test_lapse_between_streaks_notifies_twice() {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new());
        let (_trigger, mut shutdown) = shutdown::channel();
        let mut scheduler = scheduler(
            vec![html(IN_STOCK), html(SOLD_OUT), html(IN_STOCK)],
            Arc::clone(&notifier),
            clock,
        );

        for _ in 0..3 {
            scheduler.tick(&mut shutdown).await;
        }

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(scheduler.gate_state(), GateState::Armed);
    }

    #[tokio::test]
    async fn test_unknown_then_available_notifies() {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new());
        let (_trigger, mut shutdown) = shutdown::channel();
        let mut scheduler = scheduler(
            vec![ScriptedPage::Timeout, ScriptedPage::Timeout, html(IN_STOCK)],
            Arc::clone(&notifier),
            Arc::clone(&clock),
        );

        let first = scheduler.tick(&mut shutdown).await;
        assert_eq!(first.outcome.state, AvailabilityState::Unknown);
        assert_eq!(first.decision, GateDecision::Unchanged);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);

        let second = scheduler.tick(&mut shutdown).await;
        assert_eq!(second.decision, GateDecision::Notify);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_gate_armed() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let clock = Arc::new(ManualClock::new());
        let (_trigger, mut shutdown) = shutdown::channel();
        let mut scheduler = scheduler(
            vec![html(IN_STOCK), html(IN_STOCK)],
            Arc::clone(&notifier),
            clock,
        );
        let status = scheduler.status_handle();

        let first = scheduler.tick(&mut shutdown).await;
        let second = scheduler.tick(&mut shutdown).await;

        assert_eq!(first.delivered, Some(false));
        assert_eq!(second.decision, GateDecision::Suppressed);
        assert_eq!(notifier.sent().len(), 1);

        let snapshot = status.snapshot();
        assert_eq!(snapshot.delivery_failures, 1);
        assert_eq!(snapshot.notifications_sent, 0);
        assert_eq!(snapshot.gate, GateState::Armed);
    }

    #[tokio::test]
    async fn test_status_snapshot_tracks_last_outcome() {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new());
        let (_trigger, mut shutdown) = shutdown::channel();
        let mut scheduler = scheduler(vec![html(SOLD_OUT)], notifier, Arc::clone(&clock));
        let status = scheduler.status_handle();

        assert!(status.snapshot().last_outcome.is_none());

        scheduler.tick(&mut shutdown).await;

        let snapshot = status.snapshot();
        let outcome = snapshot.last_outcome.unwrap();
        assert_eq!(outcome.state, AvailabilityState::Unavailable);
        assert_eq!(outcome.observed_at, clock.now());
        assert_eq!(snapshot.ticks, 1);
        assert_eq!(snapshot.gate, GateState::Idle);
    }

    #[tokio::test]
    async fn test_run_waits_then_polls_until_shutdown() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (trigger, shutdown) = shutdown::channel();
        // Sleeps: initial delay, interval, interval -> stop.
        let clock = Arc::new(ManualClock::new().stop_after(3, trigger));
        let scheduler = scheduler(
            vec![html(IN_STOCK), html(IN_STOCK)],
            Arc::clone(&notifier),
            Arc::clone(&clock),
        );

        let status = scheduler.run(shutdown).await;

        assert_eq!(status.ticks, 2);
        assert_eq!(status.notifications_sent, 1);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(600),
                Duration::from_secs(600)
            ]
        );
    }

    #[tokio::test]
    async fn test_run_stops_before_first_check() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (trigger, shutdown) = shutdown::channel();
        trigger.trigger();
        let clock = Arc::new(ManualClock::new());
        let scheduler = scheduler(vec![html(IN_STOCK)], Arc::clone(&notifier), clock);

        let status = scheduler.run(shutdown).await;

        assert_eq!(status.ticks, 0);
        assert!(notifier.sent().is_empty());
    }
}
