//! otk-reconcile
//!
//! Merge authority for one order's snapshot.
//!
//! - Every update, from any channel, goes through [`merge`] / [`Reconciler::apply`].
//! - A terminal snapshot (`settlement` / `expire`) is frozen.
//! - Status never moves backwards in the status partial order.
//! - Payments are merged record-by-record, never replaced wholesale.
//! - The terminal transition is reported exactly once.
//!
//! Deterministic, pure logic. No IO, no clock.

mod engine;
mod reconciler;
mod types;

pub use engine::merge;
pub use reconciler::Reconciler;
pub use types::*;
