//! otk-runtime
//!
//! Live status tracking for one order at a time per session.
//!
//! - [`SnapshotStore`] owns the snapshot and publishes it on a `watch`.
//! - [`PushListener`] keeps one push connection alive with bounded backoff.
//! - [`PollTimer`] runs the initial load, the safety timer and the
//!   recurring poll.
//! - [`SessionController`] serializes everything through one merge worker
//!   and drives the [`lifecycle`] state machine.
//! - [`Tracker`] builds controllers from shared collaborators.

pub mod events;
pub mod lifecycle;
pub mod poll;
pub mod push;
pub mod session;
pub mod store;
pub mod tracker;

pub use events::{PushSignal, SessionEvent};
pub use lifecycle::{Effect, Lifecycle, SessionState, SessionView};
pub use poll::PollTimer;
pub use push::{PushHandle, PushListener};
pub use session::{SessionController, SessionDeps};
pub use store::SnapshotStore;
pub use tracker::Tracker;
