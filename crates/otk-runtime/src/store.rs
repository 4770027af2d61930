//! Snapshot Store: the only owner of a session's [`OrderSnapshot`].
//!
//! Channels never touch the snapshot; they hand updates to the merge worker,
//! which calls [`SnapshotStore::apply`]. Every change is published on a
//! `watch` channel so readers always see a whole snapshot.

use chrono::Utc;
use otk_reconcile::{MergeOutcome, ReconcileStep, Reconciler};
use otk_schemas::{InboundUpdate, OrderSnapshot};
use tokio::sync::watch;

#[derive(Debug)]
pub struct SnapshotStore {
    reconciler: Reconciler,
    tx: watch::Sender<OrderSnapshot>,
}

impl SnapshotStore {
    pub fn new(order_id: impl Into<String>) -> Self {
        let reconciler = Reconciler::new(order_id);
        let (tx, _rx) = watch::channel(reconciler.snapshot().clone());
        Self { reconciler, tx }
    }

    pub fn order_id(&self) -> &str {
        self.reconciler.order_id()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrderSnapshot> {
        self.tx.subscribe()
    }

    /// Latest published snapshot.
    pub fn current(&self) -> OrderSnapshot {
        self.tx.borrow().clone()
    }

    pub fn revision(&self) -> u64 {
        self.reconciler.snapshot().revision
    }

    pub fn is_terminal(&self) -> bool {
        self.reconciler.is_terminal()
    }

    /// Merge one update and publish the result if anything changed.
    pub fn apply(&mut self, inbound: &InboundUpdate) -> ReconcileStep {
        let step = self.reconciler.apply(inbound);
        let order_id = self.reconciler.order_id();
        let origin = inbound.origin.as_str();

        match &step.outcome {
            MergeOutcome::Applied {
                changed,
                dropped_status,
            } => {
                if let Some(stale) = dropped_status {
                    tracing::debug!(order_id, origin, status = %stale, "stale status dropped");
                }
                if !changed.is_empty() {
                    let fields: Vec<&str> = changed.iter().map(|f| f.as_str()).collect();
                    tracing::debug!(
                        order_id,
                        origin,
                        revision = self.reconciler.snapshot().revision,
                        ?fields,
                        "snapshot updated"
                    );
                    let mut published = self.reconciler.snapshot().clone();
                    published.updated_at_utc = Some(Utc::now());
                    self.tx.send_replace(published);
                }
            }
            MergeOutcome::FrozenTerminal => {
                tracing::debug!(order_id, origin, "update after terminal dropped");
            }
            MergeOutcome::ForeignOrder { got } => {
                tracing::warn!(order_id, origin, got = %got, "update for another order dropped");
            }
        }

        if let Some(status) = &step.terminal {
            tracing::info!(order_id, origin, status = %status, "order reached terminal status");
        }
        step
    }
}
