//! Request and response types for all otk-daemon HTTP endpoints.
//!
//! Response types are `Serialize` only; tests decode them as
//! `serde_json::Value`. No business logic lives here.

use otk_runtime::SessionView;
use otk_schemas::OrderSnapshot;
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/orders/:order_id
// ---------------------------------------------------------------------------

/// One tracked order: latest snapshot plus session view.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub session_id: Uuid,
    pub snapshot: OrderSnapshot,
    pub session: SessionView,
}

/// Response for `POST /v1/orders/:order_id/track`.
#[derive(Debug, Clone, Serialize)]
pub struct TrackResponse {
    /// `false` when the order was already tracked; the existing session is
    /// returned unchanged.
    pub created: bool,
    #[serde(flatten)]
    pub order: OrderResponse,
}
