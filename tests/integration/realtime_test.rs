//! Integration tests for the multiplexed realtime client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use zariz_realtime::{
    ConnectionStatus, RealtimeClient, RealtimeError, RealtimeEvent, StreamError, StreamState,
};

use crate::helpers::{
    Harness, MockTransport, advance, auth_config, mint_token, realtime_config, settle,
};

async fn logged_in() -> Harness {
    let h = Harness::new(auth_config());
    h.session.login("0501234567", "secret").await.unwrap();
    h
}

fn client(h: &Harness, transport: &Arc<MockTransport>) -> RealtimeClient {
    RealtimeClient::new(&realtime_config(), transport.clone(), h.store.clone()).unwrap()
}

fn collector() -> (Arc<Mutex<Vec<RealtimeEvent>>>, impl Fn(&RealtimeEvent) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |event: &RealtimeEvent| {
        sink.lock().unwrap().push(event.clone())
    })
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_share_one_stream() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    let first = client.subscribe(|_| {});
    let second = client.subscribe(|_| {});
    let third = client.subscribe(|_| {});
    settle().await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.subscriber_count(), 3);

    first.unsubscribe();
    drop(second);
    settle().await;
    assert_eq!(transport.open_count(), 1);
    assert!(!transport.is_closed(0));
    assert_eq!(client.status(), ConnectionStatus::Connected);

    third.unsubscribe();
    settle().await;
    assert!(transport.is_closed(0));
    assert_eq!(client.stream_state(), StreamState::Disconnected);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(!client.has_pending_reconnect());
}

#[tokio::test(start_paused = true)]
async fn test_stream_authenticates_with_current_credential() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);

    let _sub = client.subscribe(|_| {});
    settle().await;
    assert_eq!(transport.opened_with(), vec![h.current_token().unwrap()]);
}

#[tokio::test(start_paused = true)]
async fn test_events_are_normalized_and_fanned_out() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);

    let (seen_a, handler_a) = collector();
    let (seen_b, handler_b) = collector();
    let _a = client.subscribe(handler_a);
    let _b = client.subscribe(handler_b);
    settle().await;

    transport.send_raw(":ok\n\n");
    transport.send_event(r#"{"event":"order.assigned","data":{"order_id":7}}"#);
    transport.send_event(r#"{"type":"order.created","order_id":8}"#);
    transport.send_event(r#"{"order_id":9}"#);
    settle().await;

    for seen in [&seen_a, &seen_b] {
        let seen = seen.lock().unwrap();
        let names: Vec<&str> = seen.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["order.assigned", "order.created", "unknown"]);
        assert_eq!(seen[0].data, json!({ "order_id": 7 }));
        assert_eq!(seen[1].data, json!({ "type": "order.created", "order_id": 8 }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_dropped_without_reconnect() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);

    let (subscription, mut events) = client.subscribe_channel();
    settle().await;

    transport.send_event("{definitely not json");
    for n in 0..3 {
        transport.send_event(&format!(r#"{{"type":"tick","data":{{"n":{n}}}}}"#));
    }
    settle().await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event.data["n"].as_i64().unwrap());
    }
    assert_eq!(received, vec![0, 1, 2]);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.status(), ConnectionStatus::Connected);
    drop(subscription);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_does_not_block_delivery() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let _bad = client.subscribe(|_| panic!("handler bug"));
    let _good = client.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    settle().await;

    transport.send_event(r#"{"type":"a"}"#);
    transport.send_event(r#"{"type":"b"}"#);
    settle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_credential_rotation_forces_reconnect() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);

    let (seen, handler) = collector();
    let _sub = client.subscribe(handler);
    settle().await;
    let original = h.current_token().unwrap();

    // Proactive renewal stores a new credential.
    advance(Duration::from_secs(3481)).await;
    let renewed = h.current_token().unwrap();
    assert_ne!(original, renewed);

    assert_eq!(transport.opened_with(), vec![original, renewed]);
    assert!(transport.is_closed(0));
    assert!(!transport.is_closed(1));
    assert_eq!(client.status(), ConnectionStatus::Connected);

    // The existing subscriber keeps receiving on the new stream.
    transport.send_event(r#"{"type":"after.rotation"}"#);
    settle().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_credential_change_without_subscribers_does_not_connect() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let _client = client(&h, &transport);

    advance(Duration::from_secs(3481)).await;
    assert_eq!(h.auth.renew_calls(), 1);
    assert_eq!(transport.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_after_stream_error() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);
    let _sub = client.subscribe(|_| {});
    settle().await;

    transport.fail_stream(StreamError::Read("connection reset".into()));
    settle().await;
    assert_eq!(client.stream_state(), StreamState::Erroring);
    assert_eq!(client.status(), ConnectionStatus::Connecting);
    assert!(client.has_pending_reconnect());
    assert_eq!(transport.open_count(), 1);

    transport.fail_next_open(StreamError::Status(502));
    transport.fail_next_open(StreamError::Connect("refused".into()));

    // 1000ms, then doubling while opens keep failing.
    advance(Duration::from_millis(999)).await;
    assert_eq!(transport.open_count(), 1);
    advance(Duration::from_millis(1)).await;
    assert_eq!(transport.open_count(), 2);

    advance(Duration::from_millis(1999)).await;
    assert_eq!(transport.open_count(), 2);
    advance(Duration::from_millis(1)).await;
    assert_eq!(transport.open_count(), 3);

    advance(Duration::from_millis(4000)).await;
    assert_eq!(transport.open_count(), 4);
    assert_eq!(client.status(), ConnectionStatus::Connected);

    // A successful connection resets the delay.
    transport.fail_stream(StreamError::Closed);
    settle().await;
    advance(Duration::from_millis(1000)).await;
    assert_eq!(transport.open_count(), 5);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_one_reconnect_per_failed_stream() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);
    let _sub = client.subscribe(|_| {});
    settle().await;

    transport.fail_stream(StreamError::Read("reset".into()));
    transport.fail_stream(StreamError::Read("reset again".into()));
    settle().await;

    advance(Duration::from_millis(1000)).await;
    assert_eq!(transport.open_count(), 2);
    advance(Duration::from_millis(5000)).await;
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_logout_closes_stream_until_credential_returns() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);
    let _sub = client.subscribe(|_| {});
    settle().await;

    h.session.logout().await.unwrap();
    settle().await;
    assert!(transport.is_closed(0));
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(!client.has_pending_reconnect());

    advance(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);

    h.session.login("0501234567", "secret").await.unwrap();
    settle().await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_stream_error_without_credential_stops_reconnecting() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);
    let _sub = client.subscribe(|_| {});
    settle().await;

    transport.fail_stream(StreamError::Status(401));
    settle().await;
    assert!(client.has_pending_reconnect());

    h.session.logout().await.unwrap();
    settle().await;
    assert!(!client.has_pending_reconnect());
    advance(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
}

/// Claims expire against the wall clock, which paused tokio time does not
/// move. A two-second credential is stale after this.
fn outlive_short_credential() {
    std::thread::sleep(Duration::from_millis(2100));
}

#[tokio::test(start_paused = true)]
async fn test_expired_credential_is_not_used_to_reconnect() {
    let h = Harness::new(auth_config());
    let transport = MockTransport::new();
    let client = client(&h, &transport);
    assert!(h.store.set(Some(&mint_token("c-1", "courier", 2))).is_stored());
    let _sub = client.subscribe(|_| {});
    settle().await;
    assert_eq!(transport.open_count(), 1);

    outlive_short_credential();
    assert!(h.store.current().is_none());

    transport.fail_stream(StreamError::Read("reset".into()));
    settle().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(!client.has_pending_reconnect());
    advance(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);

    let fresh = mint_token("c-1", "courier", 3600);
    h.store.set(Some(&fresh));
    settle().await;
    assert_eq!(transport.opened_with().last(), Some(&fresh));
    assert_eq!(transport.open_count(), 2);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_credential_expiring_during_backoff_closes_stream() {
    let h = Harness::new(auth_config());
    let transport = MockTransport::new();
    let client = client(&h, &transport);
    h.store.set(Some(&mint_token("c-1", "courier", 2)));
    let _sub = client.subscribe(|_| {});
    settle().await;

    transport.fail_stream(StreamError::Read("reset".into()));
    settle().await;
    assert!(client.has_pending_reconnect());

    outlive_short_credential();
    advance(Duration::from_millis(1000)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.stream_state(), StreamState::Disconnected);
    assert!(!client.has_pending_reconnect());
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_before_login_connects_on_login() {
    let h = Harness::new(auth_config());
    let transport = MockTransport::new();
    let client = client(&h, &transport);

    let _sub = client.subscribe(|_| {});
    settle().await;
    assert_eq!(transport.open_count(), 0);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    h.session.login("0501234567", "secret").await.unwrap();
    settle().await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_status_watch_reports_transitions() {
    let h = logged_in().await;
    let transport = MockTransport::new();
    let client = client(&h, &transport);
    let mut status = client.status_watch();

    let sub = client.subscribe(|_| {});
    settle().await;
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Connected);

    drop(sub);
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_second_client_for_endpoint_is_rejected() {
    let h = Harness::new(auth_config());
    let transport = MockTransport::new();

    let first = client(&h, &transport);
    let second = RealtimeClient::new(&realtime_config(), transport.clone(), h.store.clone());
    assert_eq!(
        second.unwrap_err(),
        RealtimeError::DuplicateEndpoint(first.endpoint().to_string())
    );

    drop(first);
    assert!(RealtimeClient::new(&realtime_config(), transport.clone(), h.store.clone()).is_ok());
}
