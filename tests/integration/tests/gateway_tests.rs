//! Event gateway integration tests
//!
//! Each test runs a `GatewayConnection` against a scripted mock gateway on an
//! ephemeral port.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use gateway_session::protocol::{PresenceUpdatePayload, VoiceStateUpdatePayload};
use gateway_session::{
    ConnectionState, GatewayConnection, GatewayError, GatewayEvent, GatewayMessage, OpCode,
    RateLimitError,
};
use integration_tests::*;
use serde_json::{json, Value};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

async fn expect_dispatch(
    events: &mut tokio::sync::mpsc::Receiver<GatewayEvent>,
    name: &str,
) -> GatewayMessage {
    match next_event(events, WAIT).await.expect("no event") {
        GatewayEvent::Message(message) => {
            assert_eq!(message.t.as_deref(), Some(name), "unexpected dispatch {message}");
            message
        }
        other => panic!("expected {name}, got {other:?}"),
    }
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_identify_ready_and_dispatch() {
    let mock = MockGateway::start(
        Flavor::Event,
        vec![ConnectionScript::default().then_send(message_create(2, "hello"))],
    )
    .await
    .unwrap();
    let (conn, mut events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    let identify = mock
        .wait_for_op(0, OpCode::Identify.as_u8(), WAIT)
        .await
        .unwrap();
    assert_eq!(identify.message.d["token"], TOKEN);
    assert_eq!(identify.message.d["shard"], Value::Null);

    expect_dispatch(&mut events, "READY").await;
    let message = expect_dispatch(&mut events, "MESSAGE_CREATE").await;
    assert_eq!(message.d["content"], "hello");

    assert_eq!(conn.state(), ConnectionState::Ready);
    let session = conn.session().unwrap();
    assert_eq!(session.id, SESSION_ID);
    assert_eq!(session.sequence, Some(2));

    conn.close().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_double_open_is_rejected() {
    let mock = MockGateway::start(Flavor::Event, vec![]).await.unwrap();
    let (conn, _events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();
    let second = conn.open().await;
    assert!(matches!(second, Err(GatewayError::AlreadyConnected)));

    conn.close().await;
}

#[tokio::test]
async fn test_close_then_reopen_identifies() {
    let mock = MockGateway::start(Flavor::Event, vec![]).await.unwrap();
    let (conn, mut events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();
    expect_dispatch(&mut events, "READY").await;

    conn.close().await;
    assert!(conn.session().is_none());

    conn.open().await.unwrap();
    mock.wait_for_op(1, OpCode::Identify.as_u8(), WAIT)
        .await
        .unwrap();
    assert!(!mock.ops(1).contains(&OpCode::Resume.into()));

    // A user close does not produce a Closed event
    expect_dispatch(&mut events, "READY").await;
    conn.close().await;
}

#[tokio::test]
async fn test_undecodable_frames_do_not_end_the_session() {
    let mock = MockGateway::start(
        Flavor::Event,
        vec![ConnectionScript::default()
            .then_send_raw("not json")
            .then_send_raw(r#"{"d":{"missing":"op"}}"#)
            .then_send(GatewayMessage::new(OpCode::Hello, json!({ "heartbeat_interval": "soon" })))
            .then_send(GatewayMessage::dispatch("READY", 2, json!({ "user": {} })))
            .then_send(message_create(3, "still here"))],
    )
    .await
    .unwrap();
    let (conn, mut events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    expect_dispatch(&mut events, "READY").await;
    let message = expect_dispatch(&mut events, "MESSAGE_CREATE").await;
    assert_eq!(message.d["content"], "still here");

    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(mock.connection_count(), 1);
    let session = conn.session().unwrap();
    assert_eq!(session.id, SESSION_ID);
    assert_eq!(session.sequence, Some(3));
    // A dropped Hello must not trigger a second identify
    assert_eq!(
        mock.ops(0)
            .iter()
            .filter(|op| **op == u16::from(OpCode::Identify))
            .count(),
        1
    );

    conn.close().await;
}

// ============================================================================
// Close codes and server requests
// ============================================================================

#[tokio::test]
async fn test_terminal_close_code_stops_for_good() {
    let mock = MockGateway::start(Flavor::Event, vec![ConnectionScript::default().then_close(4004)])
        .await
        .unwrap();
    let (conn, mut events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();
    expect_dispatch(&mut events, "READY").await;

    match next_event(&mut events, WAIT).await.unwrap() {
        GatewayEvent::Closed(notice) => assert_eq!(notice.code, Some(4004)),
        other => panic!("expected Closed, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mock.connection_count(), 1);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(conn.session().is_none());
    assert!(
        tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err(),
        "Closed must be sent exactly once"
    );
}

#[tokio::test]
async fn test_resumable_close_code_resumes() {
    let mock = MockGateway::start(Flavor::Event, vec![ConnectionScript::default().then_close(4000)])
        .await
        .unwrap();
    let (conn, mut events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();
    expect_dispatch(&mut events, "READY").await;

    let resume = mock
        .wait_for_op(1, OpCode::Resume.as_u8(), WAIT)
        .await
        .unwrap();
    assert_eq!(resume.message.d["session_id"], SESSION_ID);
    assert_eq!(resume.message.d["seq"], 1);
    assert!(!mock.ops(1).contains(&OpCode::Identify.into()));

    expect_dispatch(&mut events, "RESUMED").await;
    eventually(WAIT, || conn.state() == ConnectionState::Ready)
        .await
        .unwrap();
    conn.close().await;
}

#[tokio::test]
async fn test_session_timeout_close_reidentifies() {
    let mock = MockGateway::start(Flavor::Event, vec![ConnectionScript::default().then_close(4009)])
        .await
        .unwrap();
    let (conn, _events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    mock.wait_for_op(1, OpCode::Identify.as_u8(), WAIT)
        .await
        .unwrap();
    assert!(!mock.ops(1).contains(&OpCode::Resume.into()));
    conn.close().await;
}

#[tokio::test]
async fn test_reconnect_request_resumes() {
    let mock = MockGateway::start(
        Flavor::Event,
        vec![ConnectionScript::default().then_send(GatewayMessage::new(OpCode::Reconnect, Value::Null))],
    )
    .await
    .unwrap();
    let (conn, mut events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();
    expect_dispatch(&mut events, "READY").await;

    let resume = mock
        .wait_for_op(1, OpCode::Resume.as_u8(), WAIT)
        .await
        .unwrap();
    assert_eq!(resume.message.d["session_id"], SESSION_ID);
    expect_dispatch(&mut events, "RESUMED").await;
    conn.close().await;
}

#[tokio::test]
async fn test_non_resumable_invalid_session_reidentifies() {
    let mock = MockGateway::start(
        Flavor::Event,
        vec![ConnectionScript::default()
            .then_send(GatewayMessage::new(OpCode::InvalidSession, json!(false)))],
    )
    .await
    .unwrap();
    let (conn, _events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    mock.wait_for_op(1, OpCode::Identify.as_u8(), WAIT)
        .await
        .unwrap();
    assert!(!mock.ops(1).contains(&OpCode::Resume.into()));
    conn.close().await;
}

#[tokio::test]
async fn test_auto_reconnect_disabled_reports_close() {
    let mock = MockGateway::start(Flavor::Event, vec![ConnectionScript::default().then_close(4000)])
        .await
        .unwrap();
    let config = fast_config(mock.url()).with_auto_reconnect(false);
    let (conn, mut events) = GatewayConnection::new(event_gateway(), config);

    conn.open().await.unwrap();
    expect_dispatch(&mut events, "READY").await;

    match next_event(&mut events, WAIT).await.unwrap() {
        GatewayEvent::Closed(notice) => assert_eq!(notice.code, Some(4000)),
        other => panic!("expected Closed, got {other:?}"),
    }
    assert_eq!(mock.connection_count(), 1);
    // 4000 keeps the session for a manual resume
    assert!(conn.session().is_some());
}

// ============================================================================
// Heartbeats and limits
// ============================================================================

#[tokio::test]
async fn test_unacknowledged_heartbeat_resumes_on_new_socket() {
    let mock = MockGateway::start(
        Flavor::Event,
        vec![ConnectionScript::default()
            .heartbeat_every(Duration::from_millis(100))
            .ack(AckMode::Silent)],
    )
    .await
    .unwrap();
    let (conn, _events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    mock.wait_for_op(0, OpCode::Heartbeat.as_u8(), WAIT)
        .await
        .unwrap();
    let resume = mock
        .wait_for_op(1, OpCode::Resume.as_u8(), WAIT)
        .await
        .unwrap();
    assert_eq!(resume.message.d["session_id"], SESSION_ID);
    conn.close().await;
}

#[tokio::test]
async fn test_server_heartbeat_request_answered_immediately() {
    let mock = MockGateway::start(
        Flavor::Event,
        vec![ConnectionScript::default().then_send(GatewayMessage::new(OpCode::Heartbeat, Value::Null))],
    )
    .await
    .unwrap();
    let (conn, mut events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();
    expect_dispatch(&mut events, "READY").await;

    // The periodic heartbeat is 10s out, so this one answers the request
    let heartbeat = mock
        .wait_for_op(0, OpCode::Heartbeat, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(heartbeat.message.d, json!(1));

    eventually(WAIT, || conn.latency().is_some()).await.unwrap();
    assert_eq!(mock.connection_count(), 1);
    assert_eq!(conn.state(), ConnectionState::Ready);
    conn.close().await;
}

#[tokio::test]
async fn test_voice_state_update_is_sent() {
    let mock = MockGateway::start(Flavor::Event, vec![]).await.unwrap();
    let (conn, mut events) = GatewayConnection::new(event_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();
    expect_dispatch(&mut events, "READY").await;

    let join = VoiceStateUpdatePayload::join("guild-1", "channel-1").muted(true);
    conn.send_payload(OpCode::VoiceStateUpdate, &join, WAIT)
        .await
        .unwrap();

    let sent = mock
        .wait_for_op(0, OpCode::VoiceStateUpdate, WAIT)
        .await
        .unwrap();
    assert_eq!(sent.message.d["channel_id"], "channel-1");
    assert_eq!(sent.message.d["self_mute"], true);
    conn.close().await;
}

#[tokio::test]
async fn test_command_limit_rejects_past_deadline() {
    let mock = MockGateway::start(Flavor::Event, vec![]).await.unwrap();
    let config = fast_config(mock.url()).with_command_limit(3, Duration::from_secs(60));
    let (conn, mut events) = GatewayConnection::new(event_gateway(), config);

    conn.open().await.unwrap();
    expect_dispatch(&mut events, "READY").await;

    // Identify took the first of three permits
    let presence = PresenceUpdatePayload::status("idle");
    for _ in 0..2 {
        conn.send_payload(OpCode::PresenceUpdate, &presence, WAIT)
            .await
            .unwrap();
    }
    let third = conn
        .send_payload(OpCode::PresenceUpdate, &presence, Duration::from_millis(200))
        .await;
    assert!(matches!(
        third,
        Err(GatewayError::RateLimit(RateLimitError::Timeout))
    ));

    eventually(WAIT, || {
        mock.ops(0)
            .iter()
            .filter(|op| **op == u16::from(OpCode::PresenceUpdate))
            .count()
            == 2
    })
    .await
    .unwrap();
    conn.close().await;
}
