//! Scenario C: push connects but stays silent
//!
//! # Invariants under test
//!
//! 1. A connection that never delivers a frame does not cancel the safety
//!    timer; the session never becomes LIVE.
//! 2. The safety timer starts the recurring poll, which delivers status.
//! 3. A connect that never completes is bounded by the connect timeout while
//!    the poll keeps the snapshot moving.
//! 4. A first frame supersedes the safety timer; no polling happens.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use otk_client::PushError;
use otk_runtime::{SessionState, Tracker};
use otk_schemas::{Credential, OrderStatus};
use otk_testkit::{
    default_timing, full_order, ConnectBehavior, ScriptedFetcher, ScriptedPushTransport,
};
use serde_json::json;

async fn within<F: Future>(secs: u64, f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(secs), f)
        .await
        .expect("timed out on the virtual clock")
}

#[tokio::test(start_paused = true)]
async fn silent_connection_safety_timer_polls() {
    let fetcher = Arc::new(ScriptedFetcher::new(full_order("ord-1", "generating_ticket")));
    fetcher.push_response(Ok(full_order("ord-1", "pending")));
    let transport = Arc::new(ScriptedPushTransport::always_accepting());
    let tracker = Tracker::new(fetcher.clone(), transport.clone(), default_timing());

    let session = tracker.track("ord-1", Credential::new("tok"));

    let mut snaps = session.subscribe_snapshot();
    within(10, snaps.wait_for(|s| s.status == Some(OrderStatus::GeneratingTicket)))
        .await
        .unwrap();

    let view = session.view();
    assert_eq!(view.state, SessionState::Connecting);
    assert!(view.polling);
    assert!(!view.safety_armed);
    assert_eq!(transport.attempts(), 1);
    assert_eq!(transport.open_connections(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_connect_is_timed_out_while_poll_runs() {
    let fetcher = Arc::new(ScriptedFetcher::new(full_order("ord-1", "generating_ticket")));
    fetcher.push_response(Ok(full_order("ord-1", "pending")));
    let transport = Arc::new(ScriptedPushTransport::new(
        [],
        ConnectBehavior::Hang,
    ));
    let tracker = Tracker::new(fetcher.clone(), transport.clone(), default_timing());

    let session = tracker.track("ord-1", Credential::new("tok"));

    let mut snaps = session.subscribe_snapshot();
    within(6, snaps.wait_for(|s| s.status == Some(OrderStatus::GeneratingTicket)))
        .await
        .unwrap();
    assert_eq!(transport.attempts(), 1);

    // Connect timeout is 10s: the first attempt fails at t=10s.
    let mut views = session.subscribe_view();
    let view = within(10, views.wait_for(|v| v.push_failures == 1))
        .await
        .unwrap()
        .clone();
    assert_eq!(view.state, SessionState::Degraded);
    assert!(view.polling);
}

#[tokio::test(start_paused = true)]
async fn first_frame_supersedes_safety_timer() {
    let fetcher = Arc::new(ScriptedFetcher::new(full_order("ord-1", "pending")));
    let transport = Arc::new(ScriptedPushTransport::always_accepting());
    let tracker = Tracker::new(fetcher.clone(), transport.clone(), default_timing());

    let session = tracker.track("ord-1", Credential::new("tok"));
    let feed = within(5, transport.connection(0)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    feed.send_info(json!({ "status": "generating_ticket" }));

    tokio::time::sleep(Duration::from_secs(60)).await;

    let view = session.view();
    assert_eq!(view.state, SessionState::Live);
    assert!(!view.safety_armed);
    assert!(!view.polling);
    assert_eq!(fetcher.calls(), 1, "only the initial load");
    assert_eq!(
        session.snapshot().status,
        Some(OrderStatus::GeneratingTicket)
    );
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_close_recovers_live_with_one_connection() {
    let fetcher = Arc::new(ScriptedFetcher::new(full_order("ord-1", "pending")));
    let transport = Arc::new(ScriptedPushTransport::new(
        [ConnectBehavior::Accept, ConnectBehavior::Accept],
        ConnectBehavior::Fail(PushError::Connect("refused".to_string())),
    ));
    let tracker = Tracker::new(fetcher, transport.clone(), default_timing());

    let session = tracker.track("ord-1", Credential::new("tok"));
    let first = within(5, transport.connection(0)).await;
    first.send_info(json!({ "status": "pending" }));
    first.close();

    let mut views = session.subscribe_view();
    within(5, views.wait_for(|v| v.state == SessionState::Degraded))
        .await
        .unwrap();

    let second = within(5, transport.connection(1)).await;
    second.send_info(json!({ "status": "generating_ticket" }));
    within(5, views.wait_for(|v| v.state == SessionState::Live))
        .await
        .unwrap();

    assert_eq!(session.view().push_failures, 0);
    assert_eq!(transport.peak_open_connections(), 1);
    assert!(first.is_dropped());
}
