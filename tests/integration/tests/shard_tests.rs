//! Shard manager integration tests
//!
//! Run with: cargo test -p integration-tests --test shard_tests

use gateway_session::{ConcurrencyBucketLimiter, GatewayEvent, OpCode, ShardManager};
use integration_tests::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

async fn start_two_shards(
    max_concurrency: u32,
    cool_down: Duration,
) -> (MockGateway, ShardManager, tokio::sync::mpsc::Receiver<gateway_session::ShardEvent>) {
    let mock = MockGateway::start(Flavor::Event, vec![]).await.unwrap();
    let limiter = Arc::new(ConcurrencyBucketLimiter::new(max_concurrency, cool_down));
    let (manager, events) = ShardManager::new(fast_config(mock.url()), limiter);
    manager.add_shard(event_gateway().with_shard(0, 2));
    manager.add_shard(event_gateway().with_shard(1, 2));
    (mock, manager, events)
}

async fn identify_gap(mock: &MockGateway) -> Duration {
    let first = mock
        .wait_for_op(0, OpCode::Identify.as_u8(), WAIT)
        .await
        .unwrap();
    let second = mock
        .wait_for_op(1, OpCode::Identify.as_u8(), WAIT)
        .await
        .unwrap();
    if first.at > second.at {
        first.at - second.at
    } else {
        second.at - first.at
    }
}

#[tokio::test]
async fn test_shared_bucket_spaces_identifies() {
    let cool_down = Duration::from_millis(300);
    let (mock, manager, mut events) = start_two_shards(1, cool_down).await;

    manager.open_all().await.unwrap();

    let gap = identify_gap(&mock).await;
    assert!(gap >= Duration::from_millis(250), "identifies {gap:?} apart");

    let mut ready = BTreeSet::new();
    while ready.len() < 2 {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .unwrap()
            .unwrap();
        if let GatewayEvent::Message(message) = &event.event {
            if message.t.as_deref() == Some("READY") {
                ready.insert(event.shard_id);
            }
        }
    }
    assert_eq!(ready.into_iter().collect::<Vec<_>>(), vec![0, 1]);

    manager.close_all().await;
}

#[tokio::test]
async fn test_separate_buckets_identify_together() {
    let (mock, manager, _events) = start_two_shards(2, Duration::from_secs(2)).await;

    manager.open_all().await.unwrap();

    let gap = identify_gap(&mock).await;
    assert!(gap < Duration::from_secs(1), "identifies {gap:?} apart");

    manager.close_all().await;
}

#[tokio::test]
async fn test_identify_sends_shard_pair() {
    let (mock, manager, _events) = start_two_shards(2, Duration::from_millis(10)).await;

    manager.open_all().await.unwrap();

    let mut shards = BTreeSet::new();
    for connection in 0..2 {
        let identify = mock
            .wait_for_op(connection, OpCode::Identify.as_u8(), WAIT)
            .await
            .unwrap();
        shards.insert(identify.message.d["shard"][0].as_u64().unwrap());
        assert_eq!(identify.message.d["shard"][1], 2);
    }
    assert_eq!(shards.into_iter().collect::<Vec<_>>(), vec![0, 1]);

    manager.close_all().await;
}
