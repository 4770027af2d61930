//! Shared runtime state for otk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Each tracked order owns
//! one [`SessionController`] plus a forwarder task that mirrors its published
//! snapshot and view onto the SSE bus.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use otk_runtime::{SessionController, SessionView, Tracker};
use otk_schemas::{Credential, OrderSnapshot, OrderStatus};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api_types::OrderResponse;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    Snapshot(OrderSnapshot),
    Session {
        order_id: String,
        view: SessionView,
    },
    Terminal {
        order_id: String,
        status: OrderStatus,
    },
    LogLine {
        level: String,
        msg: String,
    },
}

impl BusMsg {
    /// SSE `event:` name.
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Snapshot(_) => "snapshot",
            BusMsg::Session { .. } => "session",
            BusMsg::Terminal { .. } => "terminal",
            BusMsg::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time daemon summary returned by GET /v1/status.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub tracked_orders: usize,
    /// Hash of the effective config the tracker was built from, if any.
    pub config_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// TrackedOrder
// ---------------------------------------------------------------------------

pub struct TrackedOrder {
    pub session_id: Uuid,
    pub session: Arc<SessionController>,
    forwarder: JoinHandle<()>,
}

impl TrackedOrder {
    pub fn response(&self) -> OrderResponse {
        OrderResponse {
            order_id: self.session.order_id().to_string(),
            session_id: self.session_id,
            snapshot: self.session.snapshot(),
            session: self.session.view(),
        }
    }

    fn dispose(&self) {
        self.session.dispose();
        self.forwarder.abort();
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    pub tracker: Tracker,
    pub config_hash: Option<String>,
    orders: RwLock<HashMap<String, TrackedOrder>>,
}

impl AppState {
    pub fn new(tracker: Tracker) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "otk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            tracker,
            config_hash: None,
            orders: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub async fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            tracked_orders: self.orders.read().await.len(),
            config_hash: self.config_hash.clone(),
        }
    }

    /// Start tracking `order_id` unless it already is. Returns the order and
    /// whether a new session was created.
    ///
    /// The order is forgotten on its own once it reaches a terminal status.
    pub async fn track(
        self: &Arc<Self>,
        order_id: &str,
        credential: Credential,
    ) -> (OrderResponse, bool) {
        let mut orders = self.orders.write().await;
        if let Some(existing) = orders.get(order_id) {
            return (existing.response(), false);
        }

        let session_id = Uuid::new_v4();
        let session = Arc::new(self.tracker.track(order_id, credential));
        let forwarder = spawn_session_forwarder(Arc::downgrade(self), &session, session_id);
        let tracked = TrackedOrder {
            session_id,
            session,
            forwarder,
        };
        let resp = tracked.response();
        tracing::info!(order_id, session_id = %tracked.session_id, "tracking started");
        self.log("INFO", format!("tracking started for order {order_id}"));
        orders.insert(order_id.to_string(), tracked);
        (resp, true)
    }

    pub async fn get(&self, order_id: &str) -> Option<OrderResponse> {
        self.orders.read().await.get(order_id).map(TrackedOrder::response)
    }

    /// Dispose and forget `order_id`. `None` if it was not tracked.
    pub async fn dispose(&self, order_id: &str) -> Option<OrderResponse> {
        let tracked = self.orders.write().await.remove(order_id)?;
        tracked.dispose();
        tracing::info!(order_id, session_id = %tracked.session_id, "tracking disposed");
        self.log("INFO", format!("tracking disposed for order {order_id}"));
        Some(tracked.response())
    }

    /// Drop a finished session. A newer session for the same order id is
    /// left alone.
    async fn evict_finished(&self, order_id: &str, session_id: Uuid) {
        let mut orders = self.orders.write().await;
        if orders.get(order_id).map(|t| t.session_id) != Some(session_id) {
            return;
        }
        if let Some(tracked) = orders.remove(order_id) {
            drop(orders);
            // The forwarder calling this is about to return; only the
            // session needs tearing down.
            tracked.session.dispose();
            tracing::info!(order_id, session_id = %session_id, "tracking finished");
            self.log("INFO", format!("tracking finished for order {order_id}"));
        }
    }

    /// Dispose every session (shutdown).
    pub async fn dispose_all(&self) -> usize {
        let drained: Vec<TrackedOrder> = self.orders.write().await.drain().map(|(_, t)| t).collect();
        for t in &drained {
            t.dispose();
        }
        drained.len()
    }

    fn log(&self, level: &str, msg: String) {
        let _ = self.bus.send(BusMsg::LogLine {
            level: level.to_string(),
            msg,
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Mirror a session's published snapshot and view onto the bus. On the
/// terminal snapshot it emits `Terminal`, evicts the order from `state` and
/// ends with the session's final view.
pub fn spawn_session_forwarder(
    state: Weak<AppState>,
    session: &SessionController,
    session_id: Uuid,
) -> JoinHandle<()> {
    let order_id = session.order_id().to_string();
    let mut snaps = session.subscribe_snapshot();
    let mut views = session.subscribe_view();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = snaps.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let snap = snaps.borrow_and_update().clone();
                    let terminal = snap.status.clone().filter(|s| s.is_terminal());
                    let Some(st) = state.upgrade() else {
                        return;
                    };
                    let _ = st.bus.send(BusMsg::Snapshot(snap));
                    if let Some(status) = terminal {
                        let _ = st.bus.send(BusMsg::Terminal {
                            order_id: order_id.clone(),
                            status,
                        });
                        st.evict_finished(&order_id, session_id).await;
                        let _ = st.bus.send(BusMsg::Session {
                            order_id: order_id.clone(),
                            view: views.borrow_and_update().clone(),
                        });
                        return;
                    }
                }
                changed = views.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let view = views.borrow_and_update().clone();
                    let Some(st) = state.upgrade() else {
                        return;
                    };
                    let _ = st.bus.send(BusMsg::Session {
                        order_id: order_id.clone(),
                        view,
                    });
                }
            }
        }
    })
}
