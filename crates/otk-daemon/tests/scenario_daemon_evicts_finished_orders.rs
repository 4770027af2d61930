//! Scenario: finished orders leave the daemon
//!
//! # Invariants under test
//!
//! 1. Once every tracked order reaches a terminal status, `tracked_orders`
//!    drops back to 0 without any explicit dispose.
//! 2. The bus sees `terminal` before the order is forgotten, and the final
//!    `session` event reports the disposed session.
//! 3. A finished order can be tracked again and gets a fresh session.
//! 4. Orders that have not finished are kept.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use otk_daemon::{routes, state};
use otk_runtime::{SessionState, Tracker};
use otk_schemas::{OrderStatus, OrderUpdate};
use otk_testkit::{default_timing, ScriptedFetcher, ScriptedPushTransport};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Every order id gets the same id-less response.
fn app_state(status: &str) -> (Arc<state::AppState>, Arc<ScriptedFetcher>) {
    let fetcher = Arc::new(ScriptedFetcher::new(OrderUpdate::status(status)));
    let transport = Arc::new(ScriptedPushTransport::always_failing());
    let tracker = Tracker::new(fetcher.clone(), transport, default_timing());
    (Arc::new(state::AppState::new(tracker)), fetcher)
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

fn track(order_id: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/v1/orders/{order_id}/track"))
        .header("Authorization", "Bearer tok")
        .body(axum::body::Body::empty())
        .unwrap()
}

fn get(order_id: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(format!("/v1/orders/{order_id}"))
        .body(axum::body::Body::empty())
        .unwrap()
}

// ---------------------------------------------------------------------------
// 1. all settled -> nothing tracked
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn settled_orders_are_evicted() {
    let (st, _fetcher) = app_state("settlement");

    for i in 0..50 {
        let (status, _) = call(routes::build_router(Arc::clone(&st)), track(&format!("ord-{i}"))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(st.status().await.tracked_orders, 0);

    let (status, _) = call(routes::build_router(Arc::clone(&st)), get("ord-7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// 2. bus order: terminal, then final disposed view
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn terminal_is_broadcast_before_eviction() {
    let (st, _fetcher) = app_state("expire");
    let mut rx = st.bus.subscribe();

    let (status, _) = call(routes::build_router(Arc::clone(&st)), track("ord-1")).await;
    assert_eq!(status, StatusCode::CREATED);

    let mut saw_terminal = false;
    let final_view = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await.expect("bus closed") {
                state::BusMsg::Terminal { order_id, status } => {
                    assert_eq!(order_id, "ord-1");
                    assert_eq!(status, OrderStatus::Expire);
                    saw_terminal = true;
                }
                state::BusMsg::Session { view, .. } if view.state == SessionState::Disposed => {
                    break view;
                }
                _ => continue,
            }
        }
    })
    .await
    .expect("no final session event");

    assert!(saw_terminal, "terminal must precede the final view");
    assert_eq!(final_view.state, SessionState::Disposed);
    assert_eq!(st.status().await.tracked_orders, 0);
}

// ---------------------------------------------------------------------------
// 3. re-track after finish
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn finished_order_can_be_tracked_again() {
    let (st, fetcher) = app_state("settlement");

    let (_, body) = call(routes::build_router(Arc::clone(&st)), track("ord-1")).await;
    let first: serde_json::Value = serde_json::from_slice(&body).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(st.status().await.tracked_orders, 0);

    fetcher.set_default(Ok(OrderUpdate::status("pending")));
    let (status, body) = call(routes::build_router(Arc::clone(&st)), track("ord-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    let second: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_ne!(second["session_id"], first["session_id"]);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(st.status().await.tracked_orders, 1);
    st.dispose_all().await;
}

// ---------------------------------------------------------------------------
// 4. unfinished orders stay
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pending_orders_are_kept() {
    let (st, _fetcher) = app_state("pending");

    for i in 0..3 {
        call(routes::build_router(Arc::clone(&st)), track(&format!("ord-{i}"))).await;
    }
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(st.status().await.tracked_orders, 3);

    let (status, _) = call(routes::build_router(Arc::clone(&st)), get("ord-2")).await;
    assert_eq!(status, StatusCode::OK);
    st.dispose_all().await;
}
