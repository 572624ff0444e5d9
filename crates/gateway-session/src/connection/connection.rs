//! Gateway connection state machine
//!
//! A [`GatewayConnection`] owns one WebSocket session end to end: dialing, the
//! Hello handshake, identify or resume, the read loop, heartbeats and
//! reconnection. The event and voice gateways both run through it with a
//! different [`GatewayProtocol`].

use super::heartbeat::{run_heartbeat, HeartbeatFault, HeartbeatSink};
use super::{
    CloseNotice, ConnectionConfig, ConnectionState, GatewayEvent, HeartbeatState,
    ReconnectCoordinator, Session,
};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{
    is_graceful, ClosePolicy, GatewayMessage, GatewayProtocol, Inbound, CLIENT_RECONNECT,
    NORMAL_CLOSURE,
};
use crate::ratelimit::CommandRateLimiter;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Best-effort deadline for writing a close frame
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Floor for server-provided heartbeat intervals
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Largest close reason a WebSocket close frame can carry, in bytes
const MAX_CLOSE_REASON: usize = 123;

/// Cut a close reason to the frame limit on a character boundary
fn truncate_close_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

#[derive(Debug, Default)]
struct Tracker {
    session: Option<Session>,
    sequence: Option<u64>,
}

impl Tracker {
    fn observe(&mut self, sequence: u64) {
        if self.sequence.map_or(true, |current| sequence > current) {
            self.sequence = Some(sequence);
        }
        if let Some(session) = &mut self.session {
            session.observe_sequence(sequence);
        }
    }

    fn clear(&mut self) {
        self.session = None;
        self.sequence = None;
    }
}

/// Tasks and signals tied to one open socket
struct Link {
    generation: u64,
    cancel: CancellationToken,
    heartbeat: Option<JoinHandle<()>>,
    fault_tx: mpsc::Sender<HeartbeatFault>,
}

/// Why a read loop stopped
#[derive(Debug)]
struct Exit {
    code: Option<u16>,
    reason: String,
    policy: ClosePolicy,
    /// Close frame to send on teardown, for client-initiated restarts
    close_frame: Option<u16>,
}

impl Exit {
    fn server(code: Option<u16>, reason: impl Into<String>, policy: ClosePolicy) -> Self {
        Self {
            code,
            reason: reason.into(),
            policy,
            close_frame: None,
        }
    }

    fn client(reason: impl Into<String>, policy: ClosePolicy) -> Self {
        Self {
            code: Some(CLIENT_RECONNECT),
            reason: reason.into(),
            policy,
            close_frame: Some(CLIENT_RECONNECT),
        }
    }
}

struct Shared<P> {
    protocol: P,
    config: ConnectionConfig,
    /// Write half of the socket; open, close and writes are serialized on it
    socket: Mutex<Option<WsSink>>,
    state: parking_lot::RwLock<ConnectionState>,
    tracker: parking_lot::Mutex<Tracker>,
    heartbeat: Arc<parking_lot::Mutex<HeartbeatState>>,
    commands: CommandRateLimiter,
    link: parking_lot::Mutex<Option<Link>>,
    generation: AtomicU64,
    /// Cancelled by `close`; replaced by the next `open`
    lifecycle: parking_lot::Mutex<CancellationToken>,
    events: mpsc::Sender<GatewayEvent>,
}

impl<P: GatewayProtocol> Shared<P> {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "State changed");
        }
    }

    async fn dial(self: &Arc<Self>) -> GatewayResult<()> {
        let mut socket = self.socket.lock().await;
        if socket.is_some() {
            return Err(GatewayError::AlreadyConnected);
        }
        let lifecycle = self.lifecycle.lock().clone();
        if lifecycle.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let endpoint = self
            .tracker
            .lock()
            .session
            .as_ref()
            .and_then(|session| session.endpoint.clone())
            .unwrap_or_else(|| self.config.endpoint.clone());
        let url = self.protocol.url(&endpoint);

        self.set_state(ConnectionState::Connecting);
        debug!(url = %url, "Dialing gateway");

        let dialed = tokio::select! {
            biased;
            () = lifecycle.cancelled() => {
                self.set_state(ConnectionState::Disconnected);
                return Err(GatewayError::Cancelled);
            }
            dialed = timeout(self.config.dial_timeout, connect_async(url.as_str())) => dialed,
        };
        let stream = match dialed {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(err)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(err.into());
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(GatewayError::Timeout("dial"));
            }
        };

        let (sink, source) = stream.split();
        *socket = Some(sink);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = lifecycle.child_token();
        let (fault_tx, fault_rx) = mpsc::channel(1);
        *self.link.lock() = Some(Link {
            generation,
            cancel: cancel.clone(),
            heartbeat: None,
            fault_tx,
        });
        self.set_state(ConnectionState::WaitingForHandshake);
        drop(socket);

        info!(generation, "Gateway socket open");
        spawn_reader(Arc::clone(self), source, generation, cancel, fault_rx);
        Ok(())
    }

    /// Stop the heartbeat, send a close frame if asked and release the socket
    ///
    /// With a generation, only tears down if that socket is still current.
    /// Returns false when the socket was already replaced or released.
    async fn teardown(&self, generation: Option<u64>, close_frame: Option<(u16, String)>) -> bool {
        let mut socket = self.socket.lock().await;

        let link = {
            let mut slot = self.link.lock();
            let current = slot.as_ref().map(|link| link.generation);
            if generation.is_some() && current != generation {
                return false;
            }
            slot.take()
        };
        if let Some(link) = link {
            link.cancel.cancel();
        }

        if let Some(mut sink) = socket.take() {
            if let Some((code, reason)) = close_frame {
                let frame = CloseFrame {
                    code: WsCloseCode::from(code),
                    reason: Cow::Owned(truncate_close_reason(reason)),
                };
                if !matches!(
                    timeout(CLOSE_FRAME_TIMEOUT, sink.send(Message::Close(Some(frame)))).await,
                    Ok(Ok(()))
                ) {
                    debug!(code, "Close frame not delivered");
                }
            }
        }
        drop(socket);

        self.set_state(ConnectionState::Disconnected);
        true
    }

    async fn send_message(&self, message: &GatewayMessage, deadline: Instant) -> GatewayResult<()> {
        if !self.state().is_open() {
            return Err(GatewayError::NotConnected);
        }

        let permit = self.commands.wait(deadline).await?;
        let text = message.to_json()?;

        let mut socket = timeout_at(deadline, self.socket.lock())
            .await
            .map_err(|_| GatewayError::Timeout("socket lock"))?;
        let sink = socket.as_mut().ok_or(GatewayError::NotConnected)?;
        timeout_at(deadline, sink.send(Message::Text(text)))
            .await
            .map_err(|_| GatewayError::Timeout("send"))??;
        drop(socket);

        permit.release();
        Ok(())
    }

    fn start_heartbeat(self: &Arc<Self>, generation: u64, interval: Duration) {
        let interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        *self.heartbeat.lock() = HeartbeatState::new(interval);

        let mut slot = self.link.lock();
        let Some(link) = slot.as_mut().filter(|link| link.generation == generation) else {
            return;
        };
        if let Some(previous) = link.heartbeat.take() {
            previous.abort();
        }
        link.heartbeat = Some(tokio::spawn(
            run_heartbeat(
                Arc::clone(self),
                Arc::clone(&self.heartbeat),
                interval,
                link.cancel.clone(),
                link.fault_tx.clone(),
            )
            .instrument(tracing::Span::current()),
        ));
    }

    /// Send Identify for a fresh session or Resume for a stored one
    async fn authenticate(&self) -> GatewayResult<()> {
        let deadline = Instant::now() + self.config.authenticate_timeout;
        let session = self.tracker.lock().session.clone();

        let (message, permit) = match &session {
            Some(session) => {
                self.set_state(ConnectionState::Resuming);
                info!(session_id = %session.id, sequence = ?session.sequence, "Resuming session");
                (self.protocol.resume(session)?, None)
            }
            None => {
                self.set_state(ConnectionState::Authenticating);
                let permit = match &self.config.bucket_limiter {
                    Some(limiter) => {
                        let shard_id = self.protocol.shard_id().unwrap_or(0);
                        Some(limiter.wait_bucket(shard_id, deadline).await?)
                    }
                    None => None,
                };
                info!("Identifying");
                (self.protocol.identify()?, permit)
            }
        };

        self.send_message(&message, deadline).await?;
        if let Some(permit) = permit {
            permit.release();
        }

        self.set_state(ConnectionState::WaitingForReady);
        Ok(())
    }

    /// Handle one text frame; returns an exit when the socket must be restarted
    async fn handle_text(self: &Arc<Self>, generation: u64, text: &str) -> Option<Exit> {
        let message = match GatewayMessage::from_json(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "Dropping undecodable frame");
                return None;
            }
        };

        if let Some(sequence) = message.s {
            self.tracker.lock().observe(sequence);
        }

        let inbound = match self.protocol.classify(&message) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!(error = %err, op = message.op, "Dropping malformed payload");
                return None;
            }
        };
        let forward = inbound.is_forwarded();

        match inbound {
            Inbound::Hello { interval } => {
                debug!(interval_ms = interval.as_millis() as u64, "Hello received");
                self.start_heartbeat(generation, interval);
                if let Err(err) = self.authenticate().await {
                    warn!(error = %err, "Authentication could not be sent");
                    return Some(Exit::client(
                        format!("authentication not sent: {err}"),
                        ClosePolicy::RESUME,
                    ));
                }
            }
            Inbound::Ready(ready) => {
                let mut tracker = self.tracker.lock();
                let sequence = tracker.sequence;
                tracker.session = Some(Session::new(ready.session_id, sequence, ready.resume_url));
                drop(tracker);
                self.set_state(ConnectionState::Ready);
                info!("Session ready");
            }
            Inbound::Resumed => {
                self.set_state(ConnectionState::Ready);
                info!("Session resumed");
            }
            Inbound::HeartbeatAck(echo) => {
                let acknowledged = self.heartbeat.lock().acknowledge(echo, Instant::now());
                if let Err(err) = acknowledged {
                    warn!(error = %err, "Heartbeat acknowledgement rejected");
                    return Some(Exit::client(err.to_string(), ClosePolicy::RESUME));
                }
            }
            Inbound::HeartbeatRequest => {
                let (nonce, interval) = {
                    let mut heartbeat = self.heartbeat.lock();
                    (heartbeat.request(Instant::now()), heartbeat.interval)
                };
                if let Err(err) = self.send_heartbeat(nonce, interval).await {
                    warn!(error = %err, "Requested heartbeat not sent");
                }
            }
            Inbound::Reconnect => {
                info!("Server requested reconnect");
                return Some(Exit::client("server requested reconnect", ClosePolicy::RESUME));
            }
            Inbound::InvalidSession { resumable } => {
                info!(resumable, "Session invalidated by server");
                let policy = if resumable {
                    ClosePolicy::RESUME
                } else {
                    ClosePolicy::NEW_SESSION
                };
                return Some(Exit::client("invalid session", policy));
            }
            Inbound::Forward => {}
        }

        if forward && self.events.send(GatewayEvent::Message(message)).await.is_err() {
            debug!("Event receiver dropped");
        }
        None
    }

    /// Tear down after a read loop exit and reconnect if the close allows it
    async fn finish(self: &Arc<Self>, generation: u64, exit: Exit) {
        let close_frame = exit.close_frame.map(|code| (code, exit.reason.clone()));
        if !self.teardown(Some(generation), close_frame).await {
            debug!("Socket already released, reader exiting");
            return;
        }

        if exit.policy.invalidates_session {
            self.tracker.lock().clear();
        }

        let notice = CloseNotice {
            code: exit.code,
            reason: exit.reason,
        };
        let lifecycle = self.lifecycle.lock().clone();
        if lifecycle.is_cancelled() {
            return;
        }

        if !exit.policy.may_reconnect || !self.config.auto_reconnect {
            info!(code = ?notice.code, reason = %notice.reason, "Connection closed for good");
            self.emit_closed(notice).await;
            return;
        }

        info!(
            code = ?notice.code,
            reason = %notice.reason,
            resume = exit.policy.resumes(),
            "Connection lost, reconnecting"
        );
        let coordinator = ReconnectCoordinator::new(self.config.reconnect);
        let result = coordinator
            .run(&lifecycle, |_attempt| {
                let shared = Arc::clone(self);
                async move { shared.dial().await }
            })
            .await;

        match result {
            Ok(()) => {}
            Err(GatewayError::Cancelled) => debug!("Reconnect abandoned by close"),
            Err(GatewayError::AlreadyConnected) => {
                warn!("Connection was reopened by the caller during reconnect");
            }
            Err(err) => {
                warn!(error = %err, "Reconnect failed");
                self.emit_closed(CloseNotice {
                    code: notice.code,
                    reason: err.to_string(),
                })
                .await;
            }
        }
    }

    async fn emit_closed(&self, notice: CloseNotice) {
        if self.events.send(GatewayEvent::Closed(notice)).await.is_err() {
            debug!("Event receiver dropped before close notice");
        }
    }
}

impl<P: GatewayProtocol> HeartbeatSink for Shared<P> {
    async fn send_heartbeat(&self, nonce: u64, timeout: Duration) -> GatewayResult<()> {
        let sequence = self.tracker.lock().sequence;
        let message = self.protocol.heartbeat(nonce, sequence);
        self.send_message(&message, Instant::now() + timeout).await
    }
}

fn spawn_reader<P: GatewayProtocol>(
    shared: Arc<Shared<P>>,
    source: WsSource,
    generation: u64,
    cancel: CancellationToken,
    fault_rx: mpsc::Receiver<HeartbeatFault>,
) {
    let span = tracing::info_span!(
        "gateway",
        kind = shared.protocol.name(),
        shard = ?shared.protocol.shard_id(),
        generation
    );
    tokio::spawn(read_loop(shared, source, generation, cancel, fault_rx).instrument(span));
}

async fn read_loop<P: GatewayProtocol>(
    shared: Arc<Shared<P>>,
    mut source: WsSource,
    generation: u64,
    cancel: CancellationToken,
    mut fault_rx: mpsc::Receiver<HeartbeatFault>,
) {
    let exit = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            Some(fault) = fault_rx.recv() => {
                break Exit::client(fault.to_string(), ClosePolicy::RESUME);
            }
            frame = source.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((None, String::new()), |frame| {
                    (Some(u16::from(frame.code)), frame.reason.into_owned())
                });
                info!(code = ?code, reason = %reason, "Server closed the socket");
                break Exit::server(code, reason, shared.protocol.close_policy(code));
            }
            Some(Ok(Message::Binary(_))) => {
                warn!("Ignoring binary frame");
                continue;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                warn!(error = %err, "WebSocket read failed");
                break Exit::server(None, err.to_string(), shared.protocol.close_policy(None));
            }
            None => {
                break Exit::server(None, "stream ended", shared.protocol.close_policy(None));
            }
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            outcome = shared.handle_text(generation, &text) => outcome,
        };
        if let Some(exit) = outcome {
            break exit;
        }
    };

    shared.finish(generation, exit).await;
}

/// One gateway session with automatic heartbeat and reconnect
///
/// Cloning yields another handle to the same connection. Events arrive on
/// the receiver returned by [`GatewayConnection::new`]; the background tasks
/// keep running until [`GatewayConnection::close`] is called or the session
/// ends for good.
pub struct GatewayConnection<P: GatewayProtocol> {
    shared: Arc<Shared<P>>,
}

impl<P: GatewayProtocol> Clone for GatewayConnection<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: GatewayProtocol> GatewayConnection<P> {
    /// Create an unconnected connection and its event receiver
    pub fn new(protocol: P, config: ConnectionConfig) -> (Self, mpsc::Receiver<GatewayEvent>) {
        let (events, receiver) = mpsc::channel(config.event_buffer.max(1));
        let commands = CommandRateLimiter::new(config.commands_per_window, config.command_window);

        let shared = Arc::new(Shared {
            protocol,
            config,
            socket: Mutex::new(None),
            state: parking_lot::RwLock::new(ConnectionState::Unconnected),
            tracker: parking_lot::Mutex::new(Tracker::default()),
            heartbeat: Arc::new(parking_lot::Mutex::new(HeartbeatState::default())),
            commands,
            link: parking_lot::Mutex::new(None),
            generation: AtomicU64::new(0),
            lifecycle: parking_lot::Mutex::new(CancellationToken::new()),
            events,
        });

        (Self { shared }, receiver)
    }

    /// Dial the gateway and start the read loop
    ///
    /// Returns once the socket is established, not once the session is ready.
    /// A stored session is resumed; otherwise the connection identifies.
    pub async fn open(&self) -> GatewayResult<()> {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.is_cancelled() {
                *lifecycle = CancellationToken::new();
            }
        }
        self.shared.dial().await
    }

    /// Write a message, giving up after `timeout`
    ///
    /// Passes through the command rate limiter.
    pub async fn send(&self, message: &GatewayMessage, timeout: Duration) -> GatewayResult<()> {
        self.shared
            .send_message(message, Instant::now() + timeout)
            .await
    }

    /// Serialize a payload under an op code and send it
    pub async fn send_payload<T: Serialize>(
        &self,
        op: impl Into<u16>,
        payload: &T,
        timeout: Duration,
    ) -> GatewayResult<()> {
        let message = GatewayMessage::with_payload(op, payload)?;
        self.send(&message, timeout).await
    }

    /// Close with a normal closure; the session is discarded
    pub async fn close(&self) {
        self.close_with_code(NORMAL_CLOSURE, "").await;
    }

    /// Close with a specific code
    ///
    /// Stops the heartbeat and any pending reconnect, sends the close frame
    /// best-effort and releases the socket. Graceful codes (1000, 1001)
    /// discard the session; any other code keeps it for a later resume.
    pub async fn close_with_code(&self, code: u16, reason: &str) {
        self.shared.lifecycle.lock().cancel();
        self.shared
            .teardown(None, Some((code, reason.to_string())))
            .await;
        if is_graceful(code) {
            self.shared.tracker.lock().clear();
        }
        info!(code, kind = self.shared.protocol.name(), "Connection closed by client");
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Round trip of the last acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.shared.heartbeat.lock().latency()
    }

    /// Stored resumable session, if any
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.shared.tracker.lock().session.clone()
    }

    /// Last sequence number received
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.shared.tracker.lock().sequence
    }

    #[must_use]
    pub fn protocol(&self) -> &P {
        &self.shared.protocol
    }
}

impl<P: GatewayProtocol> std::fmt::Debug for GatewayConnection<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("kind", &self.shared.protocol.name())
            .field("state", &self.state())
            .field("sequence", &self.sequence())
            .finish()
    }
}
