//! Session Controller: wires the channels, the merge worker and the store
//! for one order.
//!
//! # Concurrency
//! Channel tasks never touch session state. They send [`SessionEvent`]s over
//! one bounded queue; a single worker task applies them in dequeue order
//! while holding the session guard. [`SessionController::dispose`] takes the
//! same guard, sets `disposed`, and aborts every task, so once it returns no
//! further event reaches the store.
//!
//! The guard is a `std::sync::Mutex` and is never held across an await.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use otk_client::{OrderFetcher, PushTransport};
use otk_config::TimingConfig;
use otk_schemas::{Credential, OrderSnapshot, OrderStatus};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::events::SessionEvent;
use crate::lifecycle::{Effect, Lifecycle, SessionState, SessionView};
use crate::poll::PollTimer;
use crate::push::{PushHandle, PushListener};
use crate::store::SnapshotStore;

/// Collaborators shared by every session a host creates.
#[derive(Clone)]
pub struct SessionDeps {
    pub fetcher: Arc<dyn OrderFetcher>,
    pub transport: Arc<dyn PushTransport>,
    pub timing: TimingConfig,
}

struct SessionInner {
    store: SnapshotStore,
    lifecycle: Lifecycle,
    poll: PollTimer,
    push: PushHandle,
    worker: Option<JoinHandle<()>>,
    view_tx: watch::Sender<SessionView>,
    timing: TimingConfig,
    disposed: bool,
}

impl SessionInner {
    /// Apply one event. Returns `true` once nothing more can change.
    fn handle(&mut self, ev: SessionEvent) -> bool {
        let effects = match ev {
            SessionEvent::Update(inbound) => {
                let step = self.store.apply(&inbound);
                if step.is_terminal_transition() {
                    self.lifecycle.on_terminal()
                } else {
                    Vec::new()
                }
            }
            SessionEvent::Push(signal) => self.lifecycle.on_push(&signal),
            SessionEvent::SafetyElapsed => self.lifecycle.on_safety_elapsed(),
        };

        for effect in effects {
            self.apply_effect(effect);
        }
        self.publish_view();
        self.lifecycle.state().is_absorbing()
    }

    fn apply_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CancelSafety => self.poll.cancel_safety(),
            Effect::StartRecurringPoll => {
                if !self.poll.start_recurring(self.timing.poll_period) {
                    tracing::debug!(order_id = %self.store.order_id(), "recurring poll already running");
                }
            }
            Effect::StopChannels => {
                self.push.close();
                self.poll.stop();
            }
        }
    }

    fn publish_view(&self) {
        let view = SessionView {
            state: self.lifecycle.state(),
            safety_armed: self.lifecycle.safety_armed(),
            push_failures: self.lifecycle.push_failures(),
            polling: self.poll.is_recurring(),
            revision: self.store.revision(),
        };
        self.view_tx.send_if_modified(|cur| {
            if *cur == view {
                false
            } else {
                *cur = view;
                true
            }
        });
    }
}

/// One live tracking session. Dropping it disposes it.
pub struct SessionController {
    order_id: String,
    inner: Arc<Mutex<SessionInner>>,
    snapshot_rx: watch::Receiver<OrderSnapshot>,
    view_rx: watch::Receiver<SessionView>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("order_id", &self.order_id)
            .field("view", &*self.view_rx.borrow())
            .finish()
    }
}

impl SessionController {
    /// Start tracking `order_id`: initial load, safety timer and push
    /// listener all begin immediately. Must be called inside a tokio runtime.
    pub fn start(order_id: impl Into<String>, credential: Credential, deps: &SessionDeps) -> Self {
        let order_id = order_id.into();
        let timing = deps.timing;
        let (tx, rx) = mpsc::channel(timing.queue_capacity.max(1));

        let store = SnapshotStore::new(order_id.clone());
        let snapshot_rx = store.subscribe();

        let mut lifecycle = Lifecycle::new();
        lifecycle.start();
        let (view_tx, view_rx) = watch::channel(SessionView::initial());

        let mut poll = PollTimer::new(
            order_id.clone(),
            credential.clone(),
            deps.fetcher.clone(),
            tx.clone(),
        );
        poll.fetch_once();
        poll.arm_safety(timing.safety_delay);

        let push = PushListener::new(deps.transport.clone(), &timing, tx).open(&order_id, &credential);

        let inner = Arc::new(Mutex::new(SessionInner {
            store,
            lifecycle,
            poll,
            push,
            worker: None,
            view_tx,
            timing,
            disposed: false,
        }));

        let worker = tokio::spawn(run_worker(Arc::downgrade(&inner), rx));
        {
            let mut guard = lock(&inner);
            guard.worker = Some(worker);
            guard.publish_view();
        }

        tracing::info!(
            order_id = %order_id,
            safety_delay_ms = timing.safety_delay.as_millis() as u64,
            poll_period_ms = timing.poll_period.as_millis() as u64,
            "session started"
        );

        Self {
            order_id,
            inner,
            snapshot_rx,
            view_rx,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn state(&self) -> SessionState {
        self.view_rx.borrow().state
    }

    pub fn view(&self) -> SessionView {
        self.view_rx.borrow().clone()
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<OrderSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<SessionView> {
        self.view_rx.clone()
    }

    /// Resolves with the terminal status, or `None` if the session was
    /// disposed before the order reached one.
    pub async fn wait_terminal(&self) -> Option<OrderStatus> {
        let mut rx = self.view_rx.clone();
        // The sender lives as long as `self`, so this only errs if the
        // session is being torn down concurrently.
        let _ = rx.wait_for(|v| v.state.is_absorbing()).await;
        let snap = self.snapshot_rx.borrow();
        if snap.is_terminal() {
            snap.status.clone()
        } else {
            None
        }
    }

    /// Tear the session down. Idempotent; returns `true` on the call that
    /// actually disposed.
    pub fn dispose(&self) -> bool {
        let mut guard = lock(&self.inner);
        if guard.disposed {
            return false;
        }
        guard.disposed = true;
        guard.push.close();
        guard.poll.stop();
        if let Some(worker) = guard.worker.take() {
            worker.abort();
        }
        guard.lifecycle.dispose();
        guard.publish_view();
        tracing::info!(order_id = %self.order_id, "session disposed");
        true
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner).disposed
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_worker(inner: Weak<Mutex<SessionInner>>, mut rx: mpsc::Receiver<SessionEvent>) {
    while let Some(ev) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut guard = lock(&inner);
        if guard.disposed {
            return;
        }
        if guard.handle(ev) {
            tracing::debug!(order_id = %guard.store.order_id(), "merge worker finished");
            return;
        }
    }
}

/// A panic while holding the guard cannot leave the session half-merged:
/// the store publishes only after a merge completes.
fn lock(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}
