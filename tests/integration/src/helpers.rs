//! Test helpers for integration tests
//!
//! Provides a scripted mock gateway served over a real WebSocket, plus
//! utilities for waiting on asynchronous outcomes.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use gateway_session::voice::VoiceOpCode;
use gateway_session::{GatewayEvent, GatewayMessage, OpCode};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::fixtures::{AckMode, ConnectionScript, Flavor, ScriptFrame, SESSION_ID};

/// What a client frame asks the mock to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientOp {
    Identify,
    Resume,
    Heartbeat,
    Other,
}

/// A frame the mock received, with its arrival time
#[derive(Debug, Clone)]
pub struct Received {
    pub at: Instant,
    pub message: GatewayMessage,
}

struct MockState {
    flavor: Flavor,
    scripts: Mutex<VecDeque<ConnectionScript>>,
    connections: Mutex<Vec<Vec<Received>>>,
}

impl MockState {
    /// Record a new connection and pick its script
    fn accept(&self) -> (usize, ConnectionScript) {
        let mut connections = self.connections.lock();
        connections.push(Vec::new());
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        (connections.len() - 1, script)
    }

    fn record(&self, connection: usize, message: GatewayMessage) {
        if let Some(log) = self.connections.lock().get_mut(connection) {
            log.push(Received {
                at: Instant::now(),
                message,
            });
        }
    }
}

impl Flavor {
    fn hello(self, interval: Duration) -> GatewayMessage {
        match self {
            Self::Event => GatewayMessage::new(
                OpCode::Hello,
                json!({ "heartbeat_interval": interval.as_millis() as u64 }),
            ),
            Self::Voice => GatewayMessage::new(
                VoiceOpCode::Hello,
                json!({ "heartbeat_interval": interval.as_secs_f64() * 1000.0 }),
            ),
        }
    }

    fn client_op(self, op: u16) -> ClientOp {
        let Ok(op) = u8::try_from(op) else {
            return ClientOp::Other;
        };
        match self {
            Self::Event => match OpCode::from_u8(op) {
                Some(OpCode::Identify) => ClientOp::Identify,
                Some(OpCode::Resume) => ClientOp::Resume,
                Some(OpCode::Heartbeat) => ClientOp::Heartbeat,
                _ => ClientOp::Other,
            },
            Self::Voice => match VoiceOpCode::from_u8(op) {
                Some(VoiceOpCode::Identify) => ClientOp::Identify,
                Some(VoiceOpCode::Resume) => ClientOp::Resume,
                Some(VoiceOpCode::Heartbeat) => ClientOp::Heartbeat,
                _ => ClientOp::Other,
            },
        }
    }

    fn ready(self) -> GatewayMessage {
        match self {
            Self::Event => GatewayMessage::dispatch(
                "READY",
                1,
                json!({ "session_id": SESSION_ID, "user": { "id": "1" } }),
            ),
            Self::Voice => GatewayMessage::new(
                VoiceOpCode::Ready,
                json!({
                    "ssrc": 1,
                    "ip": "127.0.0.1",
                    "port": 5000,
                    "modes": ["xsalsa20_poly1305"]
                }),
            ),
        }
    }

    fn resumed(self, sequence: u64) -> GatewayMessage {
        match self {
            Self::Event => GatewayMessage::dispatch("RESUMED", sequence, Value::Null),
            Self::Voice => GatewayMessage::new(VoiceOpCode::Resumed, Value::Null),
        }
    }

    fn ack(self, mode: AckMode, heartbeat: &GatewayMessage) -> Option<GatewayMessage> {
        match (self, mode) {
            (_, AckMode::Silent) => None,
            (Self::Event, _) => Some(GatewayMessage::new(OpCode::HeartbeatAck, Value::Null)),
            (Self::Voice, AckMode::Echo) => Some(GatewayMessage::new(
                VoiceOpCode::HeartbeatAck,
                heartbeat.d.clone(),
            )),
            (Self::Voice, AckMode::WrongNonce) => {
                let wrong = heartbeat.d.as_u64().unwrap_or(0).wrapping_add(1);
                Some(GatewayMessage::new(VoiceOpCode::HeartbeatAck, json!(wrong)))
            }
        }
    }
}

/// A mock gateway listening on an ephemeral port
///
/// Each accepted connection takes the next script from the queue; once the
/// queue is empty, connections get [`ConnectionScript::default`].
pub struct MockGateway {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a mock gateway
    pub async fn start(flavor: Flavor, scripts: Vec<ConnectionScript>) -> Result<Self> {
        let state = Arc::new(MockState {
            flavor,
            scripts: Mutex::new(scripts.into()),
            connections: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/", get(gateway_handler))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Endpoint to hand to a connection config
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// Number of connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.state.connections.lock().len()
    }

    /// Frames received on one connection, in order
    pub fn received(&self, connection: usize) -> Vec<Received> {
        self.state
            .connections
            .lock()
            .get(connection)
            .cloned()
            .unwrap_or_default()
    }

    /// Op codes received on one connection, in order
    pub fn ops(&self, connection: usize) -> Vec<u16> {
        self.received(connection)
            .into_iter()
            .map(|received| received.message.op)
            .collect()
    }

    /// Wait until a connection has received a frame with `op`
    pub async fn wait_for_op(
        &self,
        connection: usize,
        op: impl Into<u16>,
        timeout: Duration,
    ) -> Result<Received> {
        let op = op.into();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self
                .received(connection)
                .into_iter()
                .find(|received| received.message.op == op)
            {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "connection {connection} never received op {op}; got {:?}",
                    self.ops(connection)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn gateway_handler(
    State(state): State<Arc<MockState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn send(socket: &mut WebSocket, message: &GatewayMessage) -> Result<()> {
    let json = message.to_json()?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &ScriptFrame) -> Result<()> {
    match frame {
        ScriptFrame::Message(message) => send(socket, message).await,
        ScriptFrame::Raw(text) => {
            socket.send(Message::Text(text.clone())).await?;
            Ok(())
        }
    }
}

async fn handle_socket(state: Arc<MockState>, mut socket: WebSocket) {
    let (index, script) = state.accept();
    let flavor = state.flavor;

    if send(&mut socket, &flavor.hello(script.hello_interval)).await.is_err() {
        return;
    }

    while let Some(Ok(frame)) = socket.recv().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(message) = GatewayMessage::from_json(&text) else {
            continue;
        };
        state.record(index, message.clone());

        let reply = match flavor.client_op(message.op) {
            ClientOp::Identify => flavor.ready(),
            ClientOp::Resume => {
                let sequence = message.d["seq"].as_u64().unwrap_or(0) + 1;
                flavor.resumed(sequence)
            }
            ClientOp::Heartbeat => {
                if let Some(ack) = flavor.ack(script.ack, &message) {
                    if send(&mut socket, &ack).await.is_err() {
                        break;
                    }
                }
                continue;
            }
            ClientOp::Other => continue,
        };

        if send(&mut socket, &reply).await.is_err() {
            break;
        }
        for extra in &script.after_auth {
            if send_frame(&mut socket, extra).await.is_err() {
                return;
            }
        }
        if let Some(code) = script.close_after_auth {
            let frame = CloseFrame {
                code,
                reason: Cow::from("scripted close"),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            break;
        }
    }
}

/// Receive the next event, failing after `timeout`
pub async fn next_event(
    events: &mut mpsc::Receiver<GatewayEvent>,
    timeout: Duration,
) -> Result<GatewayEvent> {
    tokio::time::timeout(timeout, events.recv())
        .await
        .context("timed out waiting for an event")?
        .context("event channel closed")
}

/// Poll `check` until it holds, failing after `timeout`
pub async fn eventually<F>(timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !check() {
        if Instant::now() >= deadline {
            anyhow::bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
