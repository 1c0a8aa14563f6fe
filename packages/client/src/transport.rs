//! WebSocket transport session for the real-time channel protocol.
//!
//! The service speaks socket.io over WebSocket. Only the framing subset the
//! service actually uses is implemented here: the engine.io open packet
//! (`0{...}`), ping/pong (`2`/`3`), the namespace connect ack (`40`), and
//! event packets (`42["name", payload]`).
//!
//! A [`TransportSession`] owns one logical connection. When the connection
//! drops unexpectedly it reconnects on its own (bounded attempts with a
//! fixed interval) and reports each lifecycle change as a
//! [`TransportEvent`]. A deliberate [`TransportSession::close`] suppresses
//! reconnection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::resolver::Endpoint;

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;

const PING_FRAME: &str = "2";
const PONG_FRAME: &str = "3";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport lifecycle and event notifications, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The protocol session is established and events can flow.
    Connected,
    /// A protocol event arrived from the server.
    Event { name: String, payload: Value },
    /// A reconnect attempt failed; more may follow.
    ConnectError,
    /// The connection was lost (not user-initiated).
    Disconnected,
}

/// Transport-level failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

enum Outbound {
    Frame(String),
    Shutdown,
}

/// One persistent bidirectional connection to a partition server.
pub struct TransportSession {
    outbound: mpsc::UnboundedSender<Outbound>,
    closing: Arc<AtomicBool>,
    supervisor: JoinHandle<()>,
}

impl TransportSession {
    /// Open a connection to `endpoint` and start the connection supervisor.
    ///
    /// The initial connect is performed before returning so that an
    /// unreachable endpoint surfaces as an error rather than as a stream of
    /// reconnect events.
    pub async fn connect(
        endpoint: &Endpoint,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let url = websocket_url(&endpoint.url);
        tracing::debug!("connecting to {}", url);
        let (ws, _response) = connect_async(&url).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let closing = Arc::new(AtomicBool::new(false));

        let supervisor = tokio::spawn(supervise(
            url,
            ws,
            events_tx,
            outbound_rx,
            closing.clone(),
        ));

        Ok((
            Self {
                outbound: outbound_tx,
                closing,
                supervisor,
            },
            events_rx,
        ))
    }

    /// Send one protocol event. Errors are logged, not returned; a dropped
    /// frame on a dying connection is indistinguishable from one lost in
    /// flight anyway.
    pub fn send_event(&self, name: &str, payload: &Value) {
        let frame = encode_event(name, payload);
        if self.outbound.send(Outbound::Frame(frame)).is_err() {
            tracing::warn!("dropping outbound '{}' event, transport is gone", name);
        }
    }

    /// Deliberate teardown: suppress reconnection and close the socket.
    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.outbound.send(Outbound::Shutdown);
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        self.supervisor.abort();
    }
}

/// Drive one connection after another until shutdown or the reconnect
/// budget is exhausted. Dropping the returned event receiver does not stop
/// the supervisor; closing the session does.
async fn supervise(
    url: String,
    first: WsStream,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    closing: Arc<AtomicBool>,
) {
    let mut connection = Some(first);
    let mut failed_attempts: u32 = 0;

    loop {
        if closing.load(Ordering::SeqCst) {
            break;
        }
        let ws = match connection.take() {
            Some(ws) => ws,
            None => {
                tracing::info!(
                    "reconnecting to {} (attempt {}/{})",
                    url,
                    failed_attempts + 1,
                    MAX_RECONNECT_ATTEMPTS
                );
                match connect_async(&url).await {
                    Ok((ws, _response)) => ws,
                    Err(e) => {
                        tracing::warn!("reconnect attempt failed: {}", e);
                        let _ = events.send(TransportEvent::ConnectError);
                        failed_attempts += 1;
                        if failed_attempts >= MAX_RECONNECT_ATTEMPTS {
                            tracing::error!(
                                "giving up after {} reconnect attempts",
                                MAX_RECONNECT_ATTEMPTS
                            );
                            break;
                        }
                        tokio::time::sleep(RECONNECT_INTERVAL).await;
                        continue;
                    }
                }
            }
        };
        failed_attempts = 0;

        let ended = run_connection(ws, &events, &mut outbound).await;
        if ended == ConnectionEnd::Shutdown || closing.load(Ordering::SeqCst) {
            break;
        }

        let _ = events.send(TransportEvent::Disconnected);
        tokio::time::sleep(RECONNECT_INTERVAL).await;
    }
}

#[derive(Debug, PartialEq)]
enum ConnectionEnd {
    Dropped,
    Shutdown,
}

async fn run_connection(
    ws: WsStream,
    events: &mpsc::UnboundedSender<TransportEvent>,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
) -> ConnectionEnd {
    let (mut sink, mut stream) = ws.split();
    let mut ping_timer = make_ping_timer(DEFAULT_PING_INTERVAL_MS);

    loop {
        tokio::select! {
            maybe_out = outbound.recv() => match maybe_out {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!("websocket send failed: {}", e);
                        return ConnectionEnd::Dropped;
                    }
                }
                // A closed command channel means the session handle is gone.
                Some(Outbound::Shutdown) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return ConnectionEnd::Shutdown;
                }
            },
            _ = ping_timer.tick() => {
                if sink.send(Message::Text(PING_FRAME.into())).await.is_err() {
                    return ConnectionEnd::Dropped;
                }
            }
            maybe_msg = stream.next() => match maybe_msg {
                Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                    Ok(Frame::Open(open)) => {
                        tracing::debug!("session open, ping interval {} ms", open.ping_interval);
                        ping_timer = make_ping_timer(open.ping_interval);
                    }
                    Ok(Frame::Ping) => {
                        let _ = sink.send(Message::Text(PONG_FRAME.into())).await;
                    }
                    Ok(Frame::Pong) => {}
                    Ok(Frame::SocketConnect) => {
                        let _ = events.send(TransportEvent::Connected);
                    }
                    Ok(Frame::SocketDisconnect) => {
                        tracing::info!("server closed the protocol session");
                        return ConnectionEnd::Dropped;
                    }
                    Ok(Frame::Event { name, payload }) => {
                        let _ = events.send(TransportEvent::Event { name, payload });
                    }
                    Ok(Frame::Noop) => {}
                    Err(e) => tracing::warn!("skipping malformed frame: {}", e),
                },
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("server closed the connection");
                    return ConnectionEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("websocket read error: {}", e);
                    return ConnectionEnd::Dropped;
                }
                None => return ConnectionEnd::Dropped,
            }
        }
    }
}

fn make_ping_timer(interval_ms: u64) -> tokio::time::Interval {
    let period = Duration::from_millis(interval_ms.max(1_000));
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    timer
}

/// Turn a partition URL into the websocket endpoint URL.
pub(crate) fn websocket_url(partition_url: &str) -> String {
    let base = partition_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/socket.io/?EIO=3&transport=websocket", ws_base)
}

// ========================================
// Frame codec
// ========================================

#[derive(Debug, Deserialize)]
pub(crate) struct OpenPayload {
    #[serde(rename = "pingInterval")]
    pub(crate) ping_interval: u64,
}

impl Default for OpenPayload {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL_MS,
        }
    }
}

/// A decoded inbound text frame.
#[derive(Debug)]
pub(crate) enum Frame {
    Open(OpenPayload),
    Ping,
    Pong,
    SocketConnect,
    SocketDisconnect,
    Event { name: String, payload: Value },
    Noop,
}

#[derive(Debug, Error)]
pub(crate) enum CodecError {
    #[error("unrecognized frame: {0:?}")]
    UnknownPrefix(String),

    #[error("event packet is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event packet is missing an event name")]
    MissingName,
}

pub(crate) fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    match text.as_bytes().first() {
        Some(b'0') => {
            // A malformed open payload should not kill the connection; fall
            // back to the default ping interval.
            let open = serde_json::from_str(&text[1..]).unwrap_or_default();
            Ok(Frame::Open(open))
        }
        Some(b'2') => Ok(Frame::Ping),
        Some(b'3') => Ok(Frame::Pong),
        Some(b'4') => decode_message(&text[1..]),
        Some(b'1') => Ok(Frame::Noop), // engine.io close, the ws close follows
        Some(b'6') => Ok(Frame::Noop), // engine.io noop
        _ => Err(CodecError::UnknownPrefix(truncate_for_log(text))),
    }
}

fn decode_message(rest: &str) -> Result<Frame, CodecError> {
    match rest.as_bytes().first() {
        Some(b'0') => Ok(Frame::SocketConnect),
        Some(b'1') => Ok(Frame::SocketDisconnect),
        Some(b'2') => {
            // An ack id may sit between the packet type and the array.
            let body = rest[1..].trim_start_matches(|c: char| c.is_ascii_digit());
            let value: Value = serde_json::from_str(body)?;
            let Some(array) = value.as_array() else {
                return Err(CodecError::MissingName);
            };
            let name = array
                .first()
                .and_then(Value::as_str)
                .ok_or(CodecError::MissingName)?
                .to_string();
            let payload = array.get(1).cloned().unwrap_or(Value::Null);
            Ok(Frame::Event { name, payload })
        }
        Some(b'4') => {
            tracing::debug!("server error packet: {}", rest);
            Ok(Frame::Noop)
        }
        _ => Err(CodecError::UnknownPrefix(truncate_for_log(rest))),
    }
}

/// Encode an outbound event as a socket.io event packet.
pub(crate) fn encode_event(name: &str, payload: &Value) -> String {
    // Serializing a (name, payload) tuple yields the ["name", payload] array.
    let body = serde_json::to_string(&(name, payload))
        .unwrap_or_else(|_| format!("[{:?}]", name));
    format!("42{}", body)
}

fn truncate_for_log(text: &str) -> String {
    text.chars().take(32).collect()
}
