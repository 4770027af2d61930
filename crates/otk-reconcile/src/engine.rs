use otk_schemas::{InboundUpdate, OrderSnapshot, Payment, ProductRef};

use crate::{MergeField, MergeOutcome};

fn push_field_once(changed: &mut Vec<MergeField>, f: MergeField) {
    if !changed.contains(&f) {
        changed.push(f);
    }
}

/// Pure merge: returns the snapshot that results from applying `inbound`
/// to `snapshot`. `snapshot` itself is never modified.
///
/// A terminal `snapshot` is returned unchanged.
pub fn merge(snapshot: &OrderSnapshot, inbound: &InboundUpdate) -> OrderSnapshot {
    let mut next = snapshot.clone();
    let _ = merge_in_place(&mut next, inbound);
    next
}

/// In-place merge used by [`crate::Reconciler`].
///
/// Field rules:
/// - `status`: applied only if the current status admits it (partial order,
///   terminal statuses admit nothing).
/// - `expiry_time`: overwritten when present.
/// - `product`: merged key-by-key; present keys overwrite.
/// - `payments`: see [`merge_payments`].
/// - Absent fields are left untouched.
pub(crate) fn merge_in_place(snap: &mut OrderSnapshot, inbound: &InboundUpdate) -> MergeOutcome {
    if snap.is_terminal() {
        return MergeOutcome::FrozenTerminal;
    }

    let update = &inbound.update;

    if let Some(id) = update.id.as_deref() {
        if id != snap.order_id {
            return MergeOutcome::ForeignOrder { got: id.to_string() };
        }
    }

    let mut changed: Vec<MergeField> = Vec::new();
    let mut dropped_status = None;

    // Status
    if let Some(next) = &update.status {
        let cur = snap.status.as_ref();
        if cur != Some(next) {
            if cur.map_or(true, |c| c.admits(next)) {
                snap.status = Some(next.clone());
                push_field_once(&mut changed, MergeField::Status);
            } else {
                dropped_status = Some(next.clone());
            }
        }
    }

    // Expiry
    if let Some(exp) = &update.expiry_time {
        if snap.expiry_time.as_ref() != Some(exp) {
            snap.expiry_time = Some(exp.clone());
            push_field_once(&mut changed, MergeField::ExpiryTime);
        }
    }

    // Product
    if let Some(p) = &update.product {
        if merge_product(&mut snap.product, p) {
            push_field_once(&mut changed, MergeField::Product);
        }
    }

    // Payments
    if let Some(ps) = &update.payments {
        if merge_payments(&mut snap.payments, ps, inbound.is_complete()) {
            push_field_once(&mut changed, MergeField::Payments);
        }
    }

    if !changed.is_empty() {
        snap.revision += 1;
        snap.last_origin = Some(inbound.origin);
    }

    MergeOutcome::Applied {
        changed,
        dropped_status,
    }
}

fn merge_product(existing: &mut Option<ProductRef>, incoming: &ProductRef) -> bool {
    let Some(cur) = existing.as_mut() else {
        *existing = Some(incoming.clone());
        return true;
    };

    let before = cur.clone();
    if incoming.id.is_some() {
        cur.id = incoming.id.clone();
    }
    if incoming.name.is_some() {
        cur.name = incoming.name.clone();
    }
    for (k, v) in &incoming.extra {
        cur.extra.insert(k.clone(), v.clone());
    }
    *cur != before
}

/// Record-by-record payment merge.
///
/// Each incoming record is matched against the existing list by `id`, or
/// by position when the incoming record has no id. On a match:
/// - `transaction_status` is applied when present (any origin);
/// - for complete updates, provider fields are merged key-by-key and a
///   missing `id` is filled in.
///
/// Unmatched records are appended only for complete updates; a sparse push
/// fragment cannot introduce a payment the pull endpoint has not shown.
///
/// Returns `true` if the list changed.
fn merge_payments(existing: &mut Vec<Payment>, incoming: &[Payment], complete: bool) -> bool {
    let before = existing.clone();

    for (idx, inc) in incoming.iter().enumerate() {
        match match_payment(existing, inc, idx) {
            Some(slot) => merge_payment(&mut existing[slot], inc, complete),
            None if complete => existing.push(inc.clone()),
            None => {}
        }
    }

    *existing != before
}

fn match_payment(existing: &[Payment], inc: &Payment, idx: usize) -> Option<usize> {
    match inc.id.as_deref() {
        Some(id) => existing.iter().position(|p| p.id.as_deref() == Some(id)),
        None => (idx < existing.len()).then_some(idx),
    }
}

fn merge_payment(cur: &mut Payment, inc: &Payment, complete: bool) {
    if let Some(ts) = &inc.transaction_status {
        cur.transaction_status = Some(ts.clone());
    }
    if !complete {
        return;
    }
    if cur.id.is_none() {
        cur.id = inc.id.clone();
    }
    for (k, v) in &inc.provider_fields {
        cur.provider_fields.insert(k.clone(), v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otk_schemas::{OrderStatus, OrderUpdate, UpdateOrigin};
    use serde_json::json;

    fn payment(id: Option<&str>, ts: &str) -> Payment {
        Payment {
            id: id.map(str::to_string),
            transaction_status: Some(ts.to_string()),
            provider_fields: Default::default(),
        }
    }

    fn loaded() -> OrderSnapshot {
        let mut s = OrderSnapshot::empty("ord-1");
        s.status = Some(OrderStatus::Pending);
        let mut p = payment(Some("pay-1"), "pending");
        p.provider_fields
            .insert("va_number".to_string(), json!("8808123"));
        s.payments = vec![p];
        s
    }

    #[test]
    fn pure_merge_does_not_touch_input() {
        let s = loaded();
        let out = merge(&s, &InboundUpdate::push(OrderUpdate::status("settlement")));
        assert_eq!(s.status, Some(OrderStatus::Pending));
        assert_eq!(out.status, Some(OrderStatus::Settlement));
        assert_eq!(out.revision, s.revision + 1);
        assert_eq!(out.last_origin, Some(UpdateOrigin::Push));
    }

    #[test]
    fn noop_update_does_not_bump_revision() {
        let mut s = loaded();
        let out = merge_in_place(&mut s, &InboundUpdate::poll(OrderUpdate::status("pending")));
        assert!(!out.is_changed());
        assert_eq!(s.revision, 0);
        assert_eq!(s.last_origin, None);
    }

    #[test]
    fn sparse_payment_status_keeps_provider_fields() {
        let mut s = loaded();
        let upd = OrderUpdate {
            payments: Some(vec![Payment {
                id: None,
                transaction_status: Some("settlement".to_string()),
                provider_fields: Default::default(),
            }]),
            ..OrderUpdate::default()
        };
        merge_in_place(&mut s, &InboundUpdate::push(upd));

        assert_eq!(s.payments.len(), 1);
        assert_eq!(s.payments[0].id.as_deref(), Some("pay-1"));
        assert_eq!(s.payments[0].transaction_status.as_deref(), Some("settlement"));
        assert_eq!(s.payments[0].provider_fields["va_number"], json!("8808123"));
    }

    #[test]
    fn sparse_push_never_appends_payments() {
        let mut s = loaded();
        let upd = OrderUpdate {
            payments: Some(vec![payment(Some("pay-unknown"), "settlement")]),
            ..OrderUpdate::default()
        };
        let out = merge_in_place(&mut s, &InboundUpdate::push(upd));
        assert!(!out.is_changed());
        assert_eq!(s.payments.len(), 1);
    }

    #[test]
    fn complete_update_appends_unmatched_and_merges_provider_fields() {
        let mut s = loaded();
        let mut refreshed = payment(Some("pay-1"), "pending");
        refreshed
            .provider_fields
            .insert("qr_url".to_string(), json!("https://qr.example/1"));
        let upd = OrderUpdate {
            payments: Some(vec![refreshed, payment(Some("pay-2"), "pending")]),
            ..OrderUpdate::default()
        };
        merge_in_place(&mut s, &InboundUpdate::poll(upd));

        assert_eq!(s.payments.len(), 2);
        assert_eq!(s.payments[0].provider_fields["va_number"], json!("8808123"));
        assert_eq!(
            s.payments[0].provider_fields["qr_url"],
            json!("https://qr.example/1")
        );
        assert_eq!(s.payments[1].id.as_deref(), Some("pay-2"));
    }

    #[test]
    fn product_merges_key_by_key() {
        let mut s = loaded();
        s.product = Some(ProductRef {
            id: Some("p-1".to_string()),
            name: Some("Workshop".to_string()),
            extra: Default::default(),
        });
        let mut patch = ProductRef::default();
        patch.extra.insert("seats".to_string(), json!(12));
        merge_in_place(
            &mut s,
            &InboundUpdate::push(OrderUpdate {
                product: Some(patch),
                ..OrderUpdate::default()
            }),
        );

        let p = s.product.unwrap();
        assert_eq!(p.name.as_deref(), Some("Workshop"));
        assert_eq!(p.extra["seats"], json!(12));
    }
}
