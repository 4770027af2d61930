//! Poll Timer: initial load, safety timer and the recurring full-state poll.
//!
//! Each timer is one task behind an `Option<JoinHandle>`. A second recurring
//! poll cannot be started while one exists, and the recurring task awaits
//! each fetch before waiting for the next tick, so fetches never overlap.
//! Starting the recurring poll supersedes an initial load still in flight.

use std::sync::Arc;
use std::time::Duration;

use otk_client::OrderFetcher;
use otk_schemas::{Credential, InboundUpdate};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::SessionEvent;

pub struct PollTimer {
    order_id: String,
    credential: Credential,
    fetcher: Arc<dyn OrderFetcher>,
    events: mpsc::Sender<SessionEvent>,
    initial: Option<JoinHandle<()>>,
    safety: Option<JoinHandle<()>>,
    recurring: Option<JoinHandle<()>>,
}

impl PollTimer {
    pub fn new(
        order_id: impl Into<String>,
        credential: Credential,
        fetcher: Arc<dyn OrderFetcher>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            credential,
            fetcher,
            events,
            initial: None,
            safety: None,
            recurring: None,
        }
    }

    /// Issue the initial load. Its result is tagged `initial`.
    pub fn fetch_once(&mut self) {
        abort(&mut self.initial);
        let fetcher = self.fetcher.clone();
        let events = self.events.clone();
        let order_id = self.order_id.clone();
        let credential = self.credential.clone();
        self.initial = Some(tokio::spawn(async move {
            match fetcher.fetch_order(&order_id, &credential).await {
                Ok(update) => {
                    let _ = events
                        .send(SessionEvent::Update(InboundUpdate::initial(update)))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "initial load failed");
                }
            }
        }));
    }

    /// Signal [`SessionEvent::SafetyElapsed`] after `delay` unless cancelled.
    pub fn arm_safety(&mut self, delay: Duration) {
        abort(&mut self.safety);
        let events = self.events.clone();
        let order_id = self.order_id.clone();
        self.safety = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!(order_id = %order_id, delay_ms = delay.as_millis() as u64, "safety timer elapsed");
            let _ = events.send(SessionEvent::SafetyElapsed).await;
        }));
    }

    pub fn cancel_safety(&mut self) {
        if abort(&mut self.safety) {
            tracing::debug!(order_id = %self.order_id, "safety timer cancelled");
        }
    }

    /// Fetch immediately, then every `period`. Returns `false` and does
    /// nothing if a recurring poll already exists.
    pub fn start_recurring(&mut self, period: Duration) -> bool {
        if self.recurring.is_some() {
            return false;
        }
        // The first tick fetches the same full state; one fetch at a time.
        if self.initial.as_ref().is_some_and(|t| !t.is_finished()) {
            abort(&mut self.initial);
            tracing::debug!(order_id = %self.order_id, "initial load superseded by recurring poll");
        }
        let fetcher = self.fetcher.clone();
        let events = self.events.clone();
        let order_id = self.order_id.clone();
        let credential = self.credential.clone();
        tracing::info!(order_id = %order_id, period_ms = period.as_millis() as u64, "recurring poll started");

        self.recurring = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match fetcher.fetch_order(&order_id, &credential).await {
                    Ok(update) => {
                        let ev = SessionEvent::Update(InboundUpdate::poll(update));
                        if events.send(ev).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(order_id = %order_id, error = %e, "poll fetch failed");
                    }
                }
            }
        }));
        true
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring.is_some()
    }

    pub fn is_safety_armed(&self) -> bool {
        self.safety.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel every timer and any in-flight fetch. Idempotent.
    pub fn stop(&mut self) {
        let any = abort(&mut self.initial) | abort(&mut self.safety) | abort(&mut self.recurring);
        if any {
            tracing::debug!(order_id = %self.order_id, "poll timers stopped");
        }
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn abort(slot: &mut Option<JoinHandle<()>>) -> bool {
    match slot.take() {
        Some(task) => {
            task.abort();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use otk_client::FetchError;
    use otk_schemas::{OrderUpdate, UpdateOrigin};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Takes `latency` per fetch and records the peak number in flight.
    struct SlowFetcher {
        latency: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OrderFetcher for SlowFetcher {
        async fn fetch_order(&self, _id: &str, _c: &Credential) -> Result<OrderUpdate, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(OrderUpdate::status("pending"))
        }
    }

    fn slow(latency_ms: u64) -> Arc<SlowFetcher> {
        Arc::new(SlowFetcher {
            latency: Duration::from_millis(latency_ms),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_refused() {
        let (tx, _rx) = mpsc::channel(16);
        let mut t = PollTimer::new("o-1", Credential::new("c"), slow(1), tx);
        assert!(t.start_recurring(Duration::from_secs(1)));
        assert!(!t.start_recurring(Duration::from_secs(1)));
        t.stop();
        assert!(!t.is_recurring());
        assert!(t.start_recurring(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_never_overlaps_next_tick() {
        let fetcher = slow(2_500);
        let (tx, mut rx) = mpsc::channel(64);
        let mut t = PollTimer::new("o-1", Credential::new("c"), fetcher.clone(), tx);
        t.start_recurring(Duration::from_secs(1));

        for _ in 0..4 {
            let ev = rx.recv().await.unwrap();
            assert!(matches!(ev, SessionEvent::Update(ref u) if u.origin == UpdateOrigin::Poll));
        }
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
        t.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn safety_fires_after_delay_unless_cancelled() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut t = PollTimer::new("o-1", Credential::new("c"), slow(1), tx);

        t.arm_safety(Duration::from_secs(5));
        assert!(t.is_safety_armed());
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev, SessionEvent::SafetyElapsed);

        t.arm_safety(Duration::from_secs(5));
        t.cancel_safety();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_in_flight_initial_load() {
        let fetcher = slow(1_000);
        let (tx, mut rx) = mpsc::channel(4);
        let mut t = PollTimer::new("o-1", Credential::new("c"), fetcher.clone(), tx);

        t.fetch_once();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        t.stop();
        t.stop();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
