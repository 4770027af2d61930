//! Messages carried on the session's merge queue.

use std::time::Duration;

use otk_client::PushError;
use otk_schemas::InboundUpdate;

/// Everything a channel task can tell the merge worker.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A decoded order fragment from the initial load, the poll, or push.
    Update(InboundUpdate),
    /// Health of the push connection.
    Push(PushSignal),
    /// The safety delay elapsed without being cancelled.
    SafetyElapsed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushSignal {
    /// A connection was established; the failure counter is back to 0.
    Connected,
    /// The first frame arrived on the current connection.
    FirstMessage,
    /// The connection failed and a reconnect is pending.
    ReconnectScheduled {
        failures: u32,
        delay: Duration,
        error: PushError,
    },
    /// The failure bound was reached; the listener has stopped for good.
    Exhausted { failures: u32, error: PushError },
}
