//! Shard manager
//!
//! Runs one event gateway connection per shard. All shards share a single
//! identify concurrency limiter, and their events are merged into one channel
//! tagged with the shard id.

use crate::connection::{ConnectionConfig, GatewayConnection, GatewayEvent, ReconnectCoordinator};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{EventGateway, GatewayIntents, GatewayProtocol};
use crate::ratelimit::ConcurrencyBucketLimiter;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use gateway_common::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// An event from one shard
#[derive(Debug, Clone, PartialEq)]
pub struct ShardEvent {
    pub shard_id: u32,
    pub event: GatewayEvent,
}

/// Supervises the event gateway connections of this process
pub struct ShardManager {
    shards: DashMap<u32, GatewayConnection<EventGateway>>,
    config: ConnectionConfig,
    limiter: Arc<ConcurrencyBucketLimiter>,
    events: mpsc::Sender<ShardEvent>,
    forwarders: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl ShardManager {
    /// Create an empty manager
    ///
    /// Every shard added later is connected with `config`, sharing `limiter`
    /// for identify admission.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        limiter: Arc<ConcurrencyBucketLimiter>,
    ) -> (Self, mpsc::Receiver<ShardEvent>) {
        let (events, receiver) = mpsc::channel(config.event_buffer.max(1));
        let config = config.with_bucket_limiter(Arc::clone(&limiter));

        let manager = Self {
            shards: DashMap::new(),
            config,
            limiter,
            events,
            forwarders: parking_lot::Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        };
        (manager, receiver)
    }

    /// Create a manager with every shard this process is configured to run
    #[must_use]
    pub fn from_client_config(config: &ClientConfig) -> (Self, mpsc::Receiver<ShardEvent>) {
        let limiter = Arc::new(ConcurrencyBucketLimiter::new(
            config.sharding.max_concurrency,
            Duration::from_millis(config.sharding.identify_cooldown_ms),
        ));
        let (manager, receiver) = Self::new(ConnectionConfig::from_client_config(config), limiter);

        let intents = GatewayIntents::from(config.gateway.intents);
        for shard_id in config.sharding.effective_shard_ids() {
            let gateway = EventGateway::new(config.gateway.token.clone(), intents)
                .with_shard(shard_id, config.sharding.shard_count);
            manager.add_shard(gateway);
        }

        (manager, receiver)
    }

    /// Register a shard and start forwarding its events
    ///
    /// The connection is not opened. A shard id that is already registered
    /// keeps its existing connection.
    pub fn add_shard(&self, gateway: EventGateway) -> GatewayConnection<EventGateway> {
        let shard_id = gateway.shard_id().unwrap_or(0);
        let (connection, events) = match self.shards.entry(shard_id) {
            Entry::Occupied(existing) => {
                warn!(shard_id, "Shard already registered");
                return existing.get().clone();
            }
            Entry::Vacant(slot) => {
                let (connection, events) = GatewayConnection::new(gateway, self.config.clone());
                slot.insert(connection.clone());
                (connection, events)
            }
        };

        let forwarder = tokio::spawn(
            forward_events(shard_id, events, self.events.clone(), self.shutdown.clone())
                .instrument(tracing::info_span!("shard", shard_id)),
        );
        self.forwarders.lock().push(forwarder);

        debug!(shard_id, "Shard added");
        connection
    }

    /// Open every registered shard
    ///
    /// Shards dial concurrently and retry with the connection's backoff until
    /// they are connected or the manager is closed. Identify admission is
    /// still paced by the shared limiter. Returns the first failure.
    pub async fn open_all(&self) -> GatewayResult<()> {
        let connections: Vec<_> = self
            .shard_ids()
            .into_iter()
            .filter_map(|id| self.shard(id).map(|connection| (id, connection)))
            .collect();
        let coordinator = ReconnectCoordinator::new(self.config.reconnect);

        let opened = join_all(connections.into_iter().map(|(shard_id, connection)| {
            let coordinator = &coordinator;
            async move {
                let result = coordinator
                    .run(&self.shutdown, |_attempt| {
                        let connection = connection.clone();
                        async move { connection.open().await }
                    })
                    .await;
                if let Err(err) = &result {
                    warn!(shard_id, error = %err, "Shard did not open");
                }
                result
            }
        }))
        .await;

        let result = opened.into_iter().collect::<Result<Vec<()>, GatewayError>>();
        if result.is_ok() {
            info!(shards = self.shard_count(), "All shards open");
        }
        result.map(|_| ())
    }

    /// Close every shard and stop forwarding events
    ///
    /// Final; a closed manager cannot be opened again.
    pub async fn close_all(&self) {
        self.shutdown.cancel();

        let connections: Vec<_> = self.shards.iter().map(|entry| entry.value().clone()).collect();
        join_all(connections.iter().map(|connection| connection.close())).await;

        let forwarders = std::mem::take(&mut *self.forwarders.lock());
        for forwarder in forwarders {
            if let Err(err) = forwarder.await {
                warn!(error = %err, "Event forwarder failed");
            }
        }

        info!(shards = connections.len(), "All shards closed");
    }

    /// Connection of one shard
    #[must_use]
    pub fn shard(&self, shard_id: u32) -> Option<GatewayConnection<EventGateway>> {
        self.shards.get(&shard_id).map(|entry| entry.value().clone())
    }

    /// Registered shard ids in ascending order
    #[must_use]
    pub fn shard_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.shards.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Identify limiter shared by all shards
    #[must_use]
    pub fn limiter(&self) -> &Arc<ConcurrencyBucketLimiter> {
        &self.limiter
    }
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("shards", &self.shard_ids())
            .field("max_concurrency", &self.limiter.max_concurrency())
            .field("closed", &self.shutdown.is_cancelled())
            .finish()
    }
}

async fn forward_events(
    shard_id: u32,
    mut events: mpsc::Receiver<GatewayEvent>,
    output: mpsc::Sender<ShardEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            event = events.recv() => event,
            () = shutdown.cancelled() => break,
        };
        let Some(event) = event else { break };

        if let GatewayEvent::Closed(notice) = &event {
            warn!(shard_id, %notice, "Shard stopped");
        }
        if output.send(ShardEvent { shard_id, event }).await.is_err() {
            debug!(shard_id, "Shard event receiver dropped");
            break;
        }
    }
}
