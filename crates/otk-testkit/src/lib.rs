//! otk-testkit
//!
//! Deterministic in-process collaborators for session tests:
//!
//! - [`ScriptedFetcher`]: queued pull responses with a fixed latency and
//!   in-flight accounting.
//! - [`ScriptedPushTransport`]: per-attempt connect behaviour; accepted
//!   connections are driven by the test through a [`PushFeed`].
//!
//! Both are meant for `#[tokio::test(start_paused = true)]` so timers run on
//! virtual time.

mod fetcher;
mod transport;

pub use fetcher::ScriptedFetcher;
pub use transport::{ConnectBehavior, PushFeed, ScriptedPushTransport};

use std::sync::{Mutex, MutexGuard};

use otk_config::TimingConfig;
use otk_schemas::OrderUpdate;
use serde_json::{json, Value};

/// Default timings (5s safety, 5s poll, 2s backoff base, 3 failures).
pub fn default_timing() -> TimingConfig {
    TimingConfig::default()
}

/// A complete order as the pull endpoint would return it.
pub fn full_order(order_id: &str, status: &str) -> OrderUpdate {
    let v = json!({
        "id": order_id,
        "status": status,
        "expiry_time": "2026-10-18 13:00:00",
        "product": { "id": 3, "name": "Jazz Night" },
        "payments": [
            { "id": "pay-1", "transaction_status": "pending", "payment_type": "bank_transfer" }
        ]
    });
    // Fixed literal; decoding cannot fail.
    serde_json::from_value(v).unwrap_or_default()
}

/// A push envelope of type `info` wrapping `body`.
pub fn info_frame(body: Value) -> String {
    json!({ "type": "info", "body": body }).to_string()
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
