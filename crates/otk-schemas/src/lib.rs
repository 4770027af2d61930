//! otk-schemas
//!
//! Wire and in-memory types for one tracked order. Everything the pull
//! endpoint, the push channel and the reconciler exchange is defined here;
//! there is no IO and no merge logic in this crate.

pub mod envelope;

pub use envelope::{Envelope, EnvelopeError, PushFrame, INFO_ENVELOPE};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Order status as reported by the backend.
///
/// Statuses the tracker does not know about are kept verbatim in
/// [`OrderStatus::Other`] so they can still be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    GeneratingTicket,
    /// Payment settled. **Terminal.**
    Settlement,
    /// Order expired before settlement. **Terminal.**
    Expire,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::GeneratingTicket => "generating_ticket",
            OrderStatus::Settlement => "settlement",
            OrderStatus::Expire => "expire",
            OrderStatus::Other(s) => s.as_str(),
        }
    }

    /// Returns `true` if no further status change is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Settlement | OrderStatus::Expire)
    }

    /// `true` if moving from `self` to `next` respects the partial order:
    ///
    /// ```text
    /// pending -> generating_ticket -> settlement
    /// pending -> expire
    /// ```
    ///
    /// Unrecognised statuses sit alongside `pending`. `generating_ticket`
    /// and `expire` are incomparable, so a ticket being issued can only
    /// settle. Terminal statuses admit nothing.
    pub fn admits(&self, next: &OrderStatus) -> bool {
        match self {
            OrderStatus::Settlement | OrderStatus::Expire => false,
            OrderStatus::GeneratingTicket => matches!(
                next,
                OrderStatus::GeneratingTicket | OrderStatus::Settlement
            ),
            OrderStatus::Pending | OrderStatus::Other(_) => true,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => OrderStatus::Pending,
            "generating_ticket" => OrderStatus::GeneratingTicket,
            "settlement" => OrderStatus::Settlement,
            "expire" => OrderStatus::Expire,
            _ => OrderStatus::Other(s),
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        OrderStatus::from(s.to_string())
    }
}

impl From<OrderStatus> for String {
    fn from(s: OrderStatus) -> Self {
        match s {
            OrderStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payment / ProductRef
// ---------------------------------------------------------------------------

/// One payment attempt attached to an order.
///
/// Only `transaction_status` is interpreted by the tracker. Everything else
/// the payment provider returns (VA numbers, QR urls, gross amount, ...) is
/// kept verbatim in `provider_fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(
        default,
        deserialize_with = "de_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_status: Option<String>,
    #[serde(flatten)]
    pub provider_fields: Map<String, Value>,
}

/// Product embedded in the order representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRef {
    #[serde(
        default,
        deserialize_with = "de_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// OrderUpdate
// ---------------------------------------------------------------------------

/// A partial view of an order delivered by either channel.
///
/// Every field is optional: push payloads usually carry only `status` and a
/// payment `transaction_status`, poll payloads carry the full order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    #[serde(
        default,
        deserialize_with = "de_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payments: Option<Vec<Payment>>,
}

impl OrderUpdate {
    /// Sparse update carrying only a status.
    pub fn status(status: impl Into<OrderStatus>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.status.is_none()
            && self.expiry_time.is_none()
            && self.product.is_none()
            && self.payments.is_none()
    }
}

// ---------------------------------------------------------------------------
// Origin tagging
// ---------------------------------------------------------------------------

/// Which channel produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrigin {
    /// One-shot load issued when the session starts.
    Initial,
    /// Push channel frame.
    Push,
    /// Recurring poll tick.
    Poll,
}

impl UpdateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOrigin::Initial => "initial",
            UpdateOrigin::Push => "push",
            UpdateOrigin::Poll => "poll",
        }
    }

    /// Full-state fetches are complete; push frames are sparse.
    pub fn is_complete(&self) -> bool {
        matches!(self, UpdateOrigin::Initial | UpdateOrigin::Poll)
    }
}

/// An [`OrderUpdate`] tagged with the channel it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundUpdate {
    pub origin: UpdateOrigin,
    pub update: OrderUpdate,
}

impl InboundUpdate {
    pub fn new(origin: UpdateOrigin, update: OrderUpdate) -> Self {
        Self { origin, update }
    }

    pub fn initial(update: OrderUpdate) -> Self {
        Self::new(UpdateOrigin::Initial, update)
    }

    pub fn push(update: OrderUpdate) -> Self {
        Self::new(UpdateOrigin::Push, update)
    }

    pub fn poll(update: OrderUpdate) -> Self {
        Self::new(UpdateOrigin::Poll, update)
    }

    pub fn is_complete(&self) -> bool {
        self.origin.is_complete()
    }
}

// ---------------------------------------------------------------------------
// OrderSnapshot
// ---------------------------------------------------------------------------

/// The full known state of one order.
///
/// Owned by the snapshot store of a single session. Readers only ever see
/// published copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    /// `None` until the first update carrying a status is applied.
    pub status: Option<OrderStatus>,
    pub expiry_time: Option<String>,
    pub product: Option<ProductRef>,
    pub payments: Vec<Payment>,
    /// Incremented on every applied change.
    pub revision: u64,
    pub last_origin: Option<UpdateOrigin>,
    pub updated_at_utc: Option<DateTime<Utc>>,
}

impl OrderSnapshot {
    pub fn empty(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: None,
            expiry_time: None,
            product: None,
            payments: Vec::new(),
            revision: 0,
            last_origin: None,
            updated_at_utc: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(OrderStatus::is_terminal)
    }

    /// `true` once any update carrying a status has been applied.
    pub fn is_loaded(&self) -> bool {
        self.status.is_some()
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Bearer credential presented on both channels.
///
/// **The value is redacted in `Debug` output.** Callers must never log it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<REDACTED>)")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Identifiers arrive as JSON strings or numbers depending on the endpoint.
fn de_opt_id<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<Value> = Option::deserialize(d)?;
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unsupported identifier value: {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
