//! Axum router and all HTTP handlers for otk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use otk_schemas::Credential;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::{ErrorResponse, HealthResponse, TrackResponse},
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/orders/:order_id", get(order_get))
        .route("/v1/orders/:order_id/track", post(order_track))
        .route("/v1/orders/:order_id/dispose", post(order_dispose))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(st.status().await))
}

// ---------------------------------------------------------------------------
// POST /v1/orders/:order_id/track
// ---------------------------------------------------------------------------

/// Start tracking an order with the caller's bearer credential.
///
/// `201` for a new session, `200` if the order was already tracked. The
/// credential is never stored outside the session nor echoed back.
pub(crate) async fn order_track(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if order_id.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "ORDER_ID_EMPTY");
    }
    let Some(credential) = bearer(&headers) else {
        return error(
            StatusCode::UNAUTHORIZED,
            "CREDENTIAL_MISSING: Authorization: Bearer <token> required",
        );
    };

    let (order, created) = st.track(&order_id, credential).await;
    info!(order_id = %order_id, created, "orders/track");
    let code = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (code, Json(TrackResponse { created, order })).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/orders/:order_id
// ---------------------------------------------------------------------------

pub(crate) async fn order_get(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Response {
    match st.get(&order_id).await {
        Some(order) => (StatusCode::OK, Json(order)).into_response(),
        None => not_tracked(&order_id),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/orders/:order_id/dispose
// ---------------------------------------------------------------------------

pub(crate) async fn order_dispose(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Response {
    match st.dispose(&order_id).await {
        Some(order) => {
            info!(order_id = %order_id, "orders/dispose");
            (StatusCode::OK, Json(order)).into_response()
        }
        None => not_tracked(&order_id),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bearer(headers: &HeaderMap) -> Option<Credential> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    let credential = Credential::new(token);
    (!credential.is_blank()).then_some(credential)
}

fn not_tracked(order_id: &str) -> Response {
    error(
        StatusCode::NOT_FOUND,
        format!("ORDER_NOT_TRACKED: {order_id}"),
    )
}

fn error(code: StatusCode, msg: impl Into<String>) -> Response {
    (code, Json(ErrorResponse::new(msg))).into_response()
}
