use otk_schemas::OrderStatus;

/// Snapshot field touched by a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MergeField {
    Status,
    ExpiryTime,
    Product,
    Payments,
}

impl MergeField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeField::Status => "status",
            MergeField::ExpiryTime => "expiry_time",
            MergeField::Product => "product",
            MergeField::Payments => "payments",
        }
    }
}

/// What a single merge did to the snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The update was merged. `changed` lists the fields whose value
    /// actually changed (empty for a no-op update).
    Applied {
        changed: Vec<MergeField>,
        /// A status that would have moved the order backwards and was
        /// therefore not applied. Other fields of the update still merged.
        dropped_status: Option<OrderStatus>,
    },
    /// The snapshot is terminal; the update was dropped in full.
    FrozenTerminal,
    /// The update names a different order; dropped in full.
    ForeignOrder { got: String },
}

impl MergeOutcome {
    /// `true` if the snapshot differs from before the merge.
    pub fn is_changed(&self) -> bool {
        matches!(self, MergeOutcome::Applied { changed, .. } if !changed.is_empty())
    }

    /// `true` if the update was discarded without touching the snapshot.
    pub fn is_dropped(&self) -> bool {
        matches!(
            self,
            MergeOutcome::FrozenTerminal | MergeOutcome::ForeignOrder { .. }
        )
    }
}

/// Result of [`Reconciler::apply`](crate::Reconciler::apply).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileStep {
    pub outcome: MergeOutcome,
    /// `Some(status)` on the single merge that made the snapshot terminal;
    /// `None` on every other merge, including later ones.
    pub terminal: Option<OrderStatus>,
}

impl ReconcileStep {
    pub fn is_terminal_transition(&self) -> bool {
        self.terminal.is_some()
    }
}
