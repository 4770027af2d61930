//! Scenario: daemon order routes
//!
//! # Invariants under test
//!
//! 1. `POST /v1/orders/:id/track` requires a bearer credential (401 without).
//! 2. Tracking is idempotent per order: 201 first, 200 with the same
//!    session afterwards.
//! 3. `GET` and `dispose` on an untracked order return 404.
//! 4. Dispose returns the final view (`disposed`) and forgets the order.
//! 5. A terminal snapshot is mirrored onto the bus exactly once.
//!
//! All tests are in-process; collaborators come from otk-testkit.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use otk_daemon::{routes, state};
use otk_runtime::Tracker;
use otk_schemas::OrderStatus;
use otk_testkit::{default_timing, full_order, ScriptedFetcher, ScriptedPushTransport};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app_state(initial_status: &str) -> Arc<state::AppState> {
    let fetcher = Arc::new(ScriptedFetcher::new(full_order("ord-1", initial_status)));
    let transport = Arc::new(ScriptedPushTransport::always_failing());
    let tracker = Tracker::new(fetcher, transport, default_timing());
    Arc::new(state::AppState::new(tracker).with_config_hash("abc123"))
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str, bearer: Option<&str>) -> Request<axum::body::Body> {
    let mut b = Request::builder().method("POST").uri(uri);
    if let Some(token) = bearer {
        b = b.header("Authorization", format!("Bearer {token}"));
    }
    b.body(axum::body::Body::empty()).unwrap()
}

// ---------------------------------------------------------------------------
// 1. health / status
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn health_and_status_report_service_and_config_hash() {
    let st = app_state("pending");

    let (status, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "otk-daemon");

    let (status, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["tracked_orders"], 0);
    assert_eq!(json["config_hash"], "abc123");
}

// ---------------------------------------------------------------------------
// 2. bearer required
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn track_without_bearer_is_401() {
    let st = app_state("pending");

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/orders/ord-1/track", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(parse_json(body)["error"]
        .as_str()
        .unwrap()
        .starts_with("CREDENTIAL_MISSING"));

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/orders/ord-1/track", Some("   ")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(st.status().await.tracked_orders, 0);
}

// ---------------------------------------------------------------------------
// 3. idempotent track
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn track_twice_returns_the_same_session() {
    let st = app_state("pending");

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/orders/ord-1/track", Some("tok")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let first = parse_json(body);
    assert_eq!(first["created"], true);
    assert_eq!(first["order_id"], "ord-1");
    // The credential is never echoed.
    assert!(!first.to_string().contains("tok\""));

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/orders/ord-1/track", Some("tok")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = parse_json(body);
    assert_eq!(second["created"], false);
    assert_eq!(second["session_id"], first["session_id"]);

    assert_eq!(st.status().await.tracked_orders, 1);
    st.dispose_all().await;
}

// ---------------------------------------------------------------------------
// 4. unknown orders
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn untracked_order_is_404() {
    let st = app_state("pending");

    let (status, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/orders/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse_json(body)["error"], "ORDER_NOT_TRACKED: nope");

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/orders/nope/dispose", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// 5. dispose
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dispose_returns_final_view_and_forgets_order() {
    let st = app_state("pending");

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/orders/ord-1/track", Some("tok")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Let the initial load land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (status, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/orders/ord-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["snapshot"]["status"], "pending");

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/orders/ord-1/dispose", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["session"]["state"], "disposed");

    let (status, _) = call(routes::build_router(Arc::clone(&st)), get("/v1/orders/ord-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(st.status().await.tracked_orders, 0);
}

// ---------------------------------------------------------------------------
// 6. terminal is forwarded to the bus once
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn terminal_snapshot_is_broadcast_once() {
    let st = app_state("settlement");
    let mut rx = st.bus.subscribe();

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/orders/ord-1/track", Some("tok")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let terminal = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await.expect("bus closed") {
                state::BusMsg::Terminal { order_id, status } => break (order_id, status),
                _ => continue,
            }
        }
    })
    .await
    .expect("no terminal event on the bus");
    assert_eq!(terminal, ("ord-1".to_string(), OrderStatus::Settlement));

    // Give the forwarder time to emit anything else it would.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let mut extra_terminals = 0;
    while let Ok(msg) = rx.try_recv() {
        if matches!(msg, state::BusMsg::Terminal { .. }) {
            extra_terminals += 1;
        }
    }
    assert_eq!(extra_terminals, 0);
    st.dispose_all().await;
}
