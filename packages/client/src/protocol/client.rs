//! The protocol client: the single owner of wire-protocol knowledge.
//!
//! A [`CytubeClient`] holds at most one live transport session. Inbound
//! events are decoded and fanned out synchronously to registered listeners;
//! join/login/queue are correlated against their replies with a fixed
//! timeout and an at-most-one-outstanding-per-kind guard.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::MediaRef;
use crate::protocol::dto;
use crate::protocol::event::{ChannelEvent, ChannelEventListener};
use crate::protocol::pending::{LoginReply, PendingRequests, REQUEST_TIMEOUT, RequestError};
use crate::resolver::{Endpoint, PartitionResolver, ResolveError};
use crate::transport::{TransportError, TransportEvent, TransportSession};

/// Error replies whose message starts with this refer to the channel name
/// of an in-flight join.
const INVALID_CHANNEL_PREFIX: &str = "Invalid channel name";

/// The channel-scoped command surface the session state machine drives.
///
/// [`CytubeClient`] is the production implementation; tests mock this
/// boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelApi: Send + Sync {
    /// Look up the partition endpoint hosting `channel`.
    async fn resolve(&self, channel: &str) -> Result<Endpoint, ResolveError>;

    /// Open a transport session to `endpoint`, closing any previous one.
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Join a channel; resolves when the server grants permissions.
    async fn join_channel(&self, channel: &str) -> Result<(), RequestError>;

    /// Log in; the reply carries the server-confirmed display name.
    async fn login(&self, username: &str, password: Option<String>)
    -> Result<LoginReply, RequestError>;

    /// Submit a URL to the playlist and await the correlated reply.
    async fn queue(&self, url: &str, put_last: bool, temp: bool) -> Result<(), RequestError>;

    /// Fire-and-forget chat message; a no-op without a live session.
    fn send_message(&self, message: &str);

    /// Fire-and-forget poll vote; a no-op without a live session.
    fn vote(&self, option: usize);

    /// User-initiated teardown; suppresses reconnect handling.
    fn disconnect(&self);
}

enum Wire {
    Transport(TransportSession),
    #[cfg(test)]
    Test(mpsc::UnboundedSender<(String, Value)>),
}

struct LiveSession {
    wire: Wire,
    pump: Option<JoinHandle<()>>,
}

impl LiveSession {
    fn send(&self, name: &str, payload: &Value) {
        match &self.wire {
            Wire::Transport(transport) => transport.send_event(name, payload),
            #[cfg(test)]
            Wire::Test(tx) => {
                let _ = tx.send((name.to_string(), payload.clone()));
            }
        }
    }

    fn close(&mut self) {
        match &self.wire {
            Wire::Transport(transport) => transport.close(),
            #[cfg(test)]
            Wire::Test(_) => {}
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

struct ClientInner {
    resolver: PartitionResolver,
    listeners: RwLock<Vec<Arc<dyn ChannelEventListener>>>,
    pending: PendingRequests,
    live: Mutex<Option<LiveSession>>,
}

/// Protocol client for one server connection at a time.
///
/// Cheap to clone; clones share the same connection, listeners, and
/// pending requests.
#[derive(Clone)]
pub struct CytubeClient {
    inner: Arc<ClientInner>,
}

impl CytubeClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                resolver: PartitionResolver::new(http, base_url),
                listeners: RwLock::new(Vec::new()),
                pending: PendingRequests::default(),
                live: Mutex::new(None),
            }),
        }
    }

    /// Register a listener for decoded channel events.
    ///
    /// Listeners receive events in registration order. Registration is
    /// allowed at any time, including while events are being delivered.
    pub fn add_event_listener(&self, listener: Arc<dyn ChannelEventListener>) {
        self.inner
            .listeners
            .write()
            .expect("listener registry poisoned")
            .push(listener);
    }

    fn teardown(&self) {
        let live = self
            .inner
            .live
            .lock()
            .expect("live session slot poisoned")
            .take();
        if let Some(mut live) = live {
            live.close();
        }
        // Nothing may be left waiting on a session that no longer exists.
        self.inner.pending.fail_all();
    }

    fn send<T: Serialize>(&self, name: &str, body: T) {
        let payload = serde_json::to_value(body).unwrap_or(Value::Null);
        let live = self.inner.live.lock().expect("live session slot poisoned");
        match live.as_ref() {
            Some(session) => session.send(name, &payload),
            // The UI may race ahead of connection state; that is not an error.
            None => tracing::debug!("no live session, dropping outbound '{}'", name),
        }
    }

    fn is_connected(&self) -> bool {
        self.inner
            .live
            .lock()
            .expect("live session slot poisoned")
            .is_some()
    }

    #[cfg(test)]
    fn attach_test_wire(&self) -> mpsc::UnboundedReceiver<(String, Value)> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.live.lock().expect("live session slot poisoned") = Some(LiveSession {
            wire: Wire::Test(tx),
            pump: None,
        });
        rx
    }
}

#[async_trait]
impl ChannelApi for CytubeClient {
    async fn resolve(&self, channel: &str) -> Result<Endpoint, ResolveError> {
        self.inner.resolver.resolve(channel).await
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        // Never two sessions at once.
        self.teardown();

        match TransportSession::connect(endpoint).await {
            Ok((transport, events)) => {
                let inner = self.inner.clone();
                let pump = tokio::spawn(pump_events(inner, events));
                *self.inner.live.lock().expect("live session slot poisoned") =
                    Some(LiveSession {
                        wire: Wire::Transport(transport),
                        pump: Some(pump),
                    });
                Ok(())
            }
            Err(e) => {
                self.inner.broadcast(&ChannelEvent::ConnectError);
                Err(e)
            }
        }
    }

    async fn join_channel(&self, channel: &str) -> Result<(), RequestError> {
        if !self.is_connected() {
            return Err(RequestError::NotConnected);
        }
        let (seq, rx) = self.inner.pending.register_join();
        self.send(
            "joinChannel",
            dto::JoinChannelRequest {
                name: channel.to_string(),
            },
        );
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RequestError::Disconnected),
            Err(_) => {
                self.inner.pending.abandon_join(seq);
                Err(RequestError::Timeout)
            }
        }
    }

    async fn login(
        &self,
        username: &str,
        password: Option<String>,
    ) -> Result<LoginReply, RequestError> {
        if !self.is_connected() {
            return Err(RequestError::NotConnected);
        }
        let (seq, rx) = self.inner.pending.register_login();
        self.send(
            "login",
            dto::LoginRequest {
                name: username.to_string(),
                pw: password,
            },
        );
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RequestError::Disconnected),
            Err(_) => {
                self.inner.pending.abandon_login(seq);
                Err(RequestError::Timeout)
            }
        }
    }

    async fn queue(&self, url: &str, put_last: bool, temp: bool) -> Result<(), RequestError> {
        if !self.is_connected() {
            return Err(RequestError::NotConnected);
        }
        let media = MediaRef::from_url(url);
        let (seq, rx) = self.inner.pending.register_queue(media.id.clone());
        self.send(
            "queue",
            dto::QueueRequest {
                id: media.id,
                kind: media.kind.as_wire(),
                pos: if put_last { "end" } else { "next" },
                temp,
            },
        );
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RequestError::Disconnected),
            Err(_) => {
                self.inner.pending.abandon_queue(seq);
                Err(RequestError::Timeout)
            }
        }
    }

    fn send_message(&self, message: &str) {
        self.send(
            "chatMsg",
            dto::ChatMsgRequest {
                msg: message.to_string(),
                meta: serde_json::Map::new(),
            },
        );
    }

    fn vote(&self, option: usize) {
        self.send("vote", dto::VoteRequest { option });
    }

    fn disconnect(&self) {
        // Listeners learn the intent before the socket goes away, so the
        // session state machine can tell this apart from a network drop.
        self.inner.broadcast(&ChannelEvent::UserInitiatedDisconnect);
        self.teardown();
    }
}

/// Forward transport events into correlation handling and listener fan-out.
/// Runs as its own task per live session; inbound order is preserved.
async fn pump_events(
    inner: Arc<ClientInner>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Connected => inner.broadcast(&ChannelEvent::Connected),
            TransportEvent::ConnectError => inner.broadcast(&ChannelEvent::ConnectError),
            TransportEvent::Disconnected => {
                // A reply can no longer arrive on this connection.
                inner.pending.fail_all();
                inner.broadcast(&ChannelEvent::Disconnected);
            }
            TransportEvent::Event { name, payload } => inner.dispatch(&name, payload),
        }
    }
}

impl ClientInner {
    fn dispatch(&self, name: &str, payload: Value) {
        self.handle_correlated(name, &payload);
        match dto::decode_event(name, &payload) {
            Ok(Some(event)) => self.broadcast(&event),
            Ok(None) => tracing::trace!("no listener-facing event for '{}'", name),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    /// Give reply events a chance to resolve an in-flight request before
    /// the regular fan-out.
    fn handle_correlated(&self, name: &str, payload: &Value) {
        match name {
            "setPermissions" => {
                self.pending.resolve_join(Ok(()));
            }
            "errorMsg" => {
                if let Ok(error) = serde_json::from_value::<dto::ErrorMsgDto>(payload.clone()) {
                    if error.msg.starts_with(INVALID_CHANNEL_PREFIX) {
                        self.pending
                            .resolve_join(Err(RequestError::Rejected(error.msg.clone())));
                    }
                    tracing::warn!("server error: {}", error.msg);
                }
            }
            "login" => {
                if let Ok(reply) = serde_json::from_value::<dto::LoginDto>(payload.clone()) {
                    let result = if reply.success {
                        Ok(LoginReply {
                            name: reply.name.unwrap_or_default(),
                            guest: reply.guest,
                        })
                    } else {
                        Err(RequestError::Rejected(
                            reply.error.unwrap_or_else(|| "login failed".to_string()),
                        ))
                    };
                    self.pending.resolve_login(result);
                }
            }
            "queue" => {
                if let Ok(queued) = serde_json::from_value::<dto::QueueDto>(payload.clone()) {
                    self.pending.resolve_queue(queued.item.media_id(), Ok(()));
                }
            }
            "queueFail" => {
                if let Ok(fail) = serde_json::from_value::<dto::QueueFailDto>(payload.clone()) {
                    self.pending
                        .resolve_queue(&fail.id, Err(RequestError::Rejected(fail.msg)));
                }
            }
            _ => {}
        }
    }

    fn broadcast(&self, event: &ChannelEvent) {
        // Snapshot under the read lock, deliver outside it, so listeners
        // can register more listeners without deadlocking.
        let listeners = self
            .listeners
            .read()
            .expect("listener registry poisoned")
            .clone();
        for listener in listeners {
            let delivery =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener.on_event(event)));
            if delivery.is_err() {
                tracing::error!("event listener panicked, skipping it for this event");
            }
        }
    }
}
