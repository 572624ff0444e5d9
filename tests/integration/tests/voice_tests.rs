//! Voice gateway integration tests
//!
//! Run with: cargo test -p integration-tests --test voice_tests

use gateway_session::voice::VoiceOpCode;
use gateway_session::{ConcurrencyBucketLimiter, ConnectionState, GatewayConnection, GatewayEvent};
use integration_tests::*;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_voice_handshake_and_latency() {
    let mock = MockGateway::start(
        Flavor::Voice,
        vec![ConnectionScript::default().heartbeat_every(Duration::from_millis(100))],
    )
    .await
    .unwrap();
    let (conn, mut events) = GatewayConnection::new(voice_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    let identify = mock
        .wait_for_op(0, VoiceOpCode::Identify.as_u8(), WAIT)
        .await
        .unwrap();
    assert_eq!(identify.message.d["server_id"], "guild-1");
    assert_eq!(identify.message.d["session_id"], VOICE_SESSION_ID);

    match next_event(&mut events, WAIT).await.unwrap() {
        GatewayEvent::Message(ready) => {
            assert_eq!(ready.op, u16::from(VoiceOpCode::Ready));
            assert_eq!(ready.d["ssrc"], 1);
            assert_eq!(ready.d["port"], 5000);
        }
        other => panic!("expected voice Ready, got {other:?}"),
    }
    assert_eq!(conn.state(), ConnectionState::Ready);

    let heartbeat = mock
        .wait_for_op(0, VoiceOpCode::Heartbeat.as_u8(), WAIT)
        .await
        .unwrap();
    assert!(heartbeat.message.d.is_u64(), "voice heartbeat carries the nonce");

    eventually(WAIT, || conn.latency().is_some()).await.unwrap();
    assert_eq!(mock.connection_count(), 1);
    conn.close().await;
}

#[tokio::test]
async fn test_voice_wrong_nonce_reconnects_and_resumes() {
    let mock = MockGateway::start(
        Flavor::Voice,
        vec![ConnectionScript::default()
            .heartbeat_every(Duration::from_millis(100))
            .ack(AckMode::WrongNonce)],
    )
    .await
    .unwrap();
    let (conn, _events) = GatewayConnection::new(voice_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    let resume = mock
        .wait_for_op(1, VoiceOpCode::Resume.as_u8(), WAIT)
        .await
        .unwrap();
    assert_eq!(resume.message.d["server_id"], "guild-1");
    assert_eq!(resume.message.d["session_id"], VOICE_SESSION_ID);
    assert!(!mock.ops(1).contains(&VoiceOpCode::Identify.into()));

    eventually(WAIT, || conn.state() == ConnectionState::Ready)
        .await
        .unwrap();
    conn.close().await;
}

#[tokio::test]
async fn test_voice_session_invalid_close_reidentifies() {
    let mock = MockGateway::start(Flavor::Voice, vec![ConnectionScript::default().then_close(4006)])
        .await
        .unwrap();
    let (conn, _events) = GatewayConnection::new(voice_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    mock.wait_for_op(1, VoiceOpCode::Identify.as_u8(), WAIT)
        .await
        .unwrap();
    assert!(!mock.ops(1).contains(&VoiceOpCode::Resume.into()));
    conn.close().await;
}

#[tokio::test]
async fn test_voice_disconnected_close_is_terminal() {
    let mock = MockGateway::start(Flavor::Voice, vec![ConnectionScript::default().then_close(4014)])
        .await
        .unwrap();
    let (conn, mut events) = GatewayConnection::new(voice_gateway(), fast_config(mock.url()));

    conn.open().await.unwrap();

    // Ready is forwarded before the close
    assert!(matches!(
        next_event(&mut events, WAIT).await.unwrap(),
        GatewayEvent::Message(_)
    ));
    match next_event(&mut events, WAIT).await.unwrap() {
        GatewayEvent::Closed(notice) => assert_eq!(notice.code, Some(4014)),
        other => panic!("expected Closed, got {other:?}"),
    }
    assert_eq!(mock.connection_count(), 1);
}

#[tokio::test]
async fn test_voice_connections_honor_a_shared_limiter() {
    let mock = MockGateway::start(Flavor::Voice, vec![]).await.unwrap();
    let cool_down = Duration::from_millis(300);
    let limiter = Arc::new(ConcurrencyBucketLimiter::new(1, cool_down));
    let config = fast_config(mock.url()).with_bucket_limiter(limiter);
    let (first, _first_events) = GatewayConnection::new(voice_gateway(), config.clone());
    let (second, _second_events) = GatewayConnection::new(voice_gateway(), config);

    let (a, b) = tokio::join!(first.open(), second.open());
    a.unwrap();
    b.unwrap();

    let identifies = [
        mock.wait_for_op(0, VoiceOpCode::Identify, WAIT).await.unwrap(),
        mock.wait_for_op(1, VoiceOpCode::Identify, WAIT).await.unwrap(),
    ];
    let gap = if identifies[0].at > identifies[1].at {
        identifies[0].at - identifies[1].at
    } else {
        identifies[1].at - identifies[0].at
    };
    assert!(gap >= Duration::from_millis(250), "identifies {gap:?} apart");

    first.close().await;
    second.close().await;
}
