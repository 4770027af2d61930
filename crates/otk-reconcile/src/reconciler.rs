//! Stateful reconciler for one order.
//!
//! Owns the authoritative [`OrderSnapshot`] and a one-shot terminal latch.
//! Callers serialize access (one merge at a time); this type does no locking.

use otk_schemas::{InboundUpdate, OrderSnapshot};

use crate::engine::merge_in_place;
use crate::ReconcileStep;

#[derive(Clone, Debug)]
pub struct Reconciler {
    snapshot: OrderSnapshot,
    /// Set on the first terminal transition and never cleared.
    terminal_signalled: bool,
}

impl Reconciler {
    /// Start from an empty snapshot for `order_id`.
    pub fn new(order_id: impl Into<String>) -> Self {
        Self::from_snapshot(OrderSnapshot::empty(order_id))
    }

    /// Resume from an existing snapshot.
    ///
    /// A snapshot that is already terminal will never report a terminal
    /// transition: there is no transition left to report.
    pub fn from_snapshot(snapshot: OrderSnapshot) -> Self {
        let terminal_signalled = snapshot.is_terminal();
        Self {
            snapshot,
            terminal_signalled,
        }
    }

    /// Merge one update and report whether it was the terminal transition.
    pub fn apply(&mut self, inbound: &InboundUpdate) -> ReconcileStep {
        let outcome = merge_in_place(&mut self.snapshot, inbound);

        let terminal = if !self.terminal_signalled && self.snapshot.is_terminal() {
            self.terminal_signalled = true;
            self.snapshot.status.clone()
        } else {
            None
        };

        ReconcileStep { outcome, terminal }
    }

    pub fn snapshot(&self) -> &OrderSnapshot {
        &self.snapshot
    }

    pub fn is_terminal(&self) -> bool {
        self.snapshot.is_terminal()
    }

    pub fn order_id(&self) -> &str {
        &self.snapshot.order_id
    }
}
