//! The per-channel session: lifecycle state machine, derived channel
//! state, and the single-writer actor that owns both.
//!
//! Protocol events arrive from the network task and player callbacks come
//! from wherever the embedder runs them; both funnel through one mailbox
//! and are applied by one task. Nothing else ever mutates session state,
//! which is what makes the state machine safe without locks.

pub mod chat;
pub mod playback;
pub mod playlist;
pub mod poll;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::domain::{ConnectionKind, MediaRef, PlaylistItem, PollOption, User};
use crate::protocol::client::{ChannelApi, CytubeClient};
use crate::protocol::event::{ChannelEvent, ChannelEventListener};
use crate::settings::{ClientSettings, CredentialStore};

use chat::ChatState;
use playback::PlaybackState;
use playlist::PlaylistState;
use poll::PollState;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No target channel.
    Idle,
    /// Looking up the partition for the target channel.
    Resolving,
    /// Transport opening; waiting for the protocol session.
    Connecting,
    /// Join granted; not (yet) authenticated.
    Joined,
    /// Join granted; login in flight.
    Authenticating,
    /// Fully up: joined, with login settled one way or the other.
    Active,
    /// Lost or failed; may recover via transport reconnect or user action.
    Disconnected,
}

/// The user's relationship to the target channel.
#[derive(Debug, Default)]
pub struct ConnectionStatus {
    pub current_user: Option<String>,
    pub current_channel: Option<String>,
    pub is_guest: bool,
    pub has_connected_before: bool,
    pub kicked: bool,
    pub disconnect_reason: Option<String>,
}

impl ConnectionStatus {
    pub fn connected_and_authenticated(&self) -> bool {
        self.current_user.is_some() && self.current_channel.is_some()
    }

    /// Drop the joined/authenticated state. An explicit reason replaces the
    /// stored one; `None` preserves it so the UI keeps showing the original
    /// cause until the next successful join clears it.
    fn disconnect(&mut self, reason: Option<String>) {
        self.current_user = None;
        self.current_channel = None;
        self.is_guest = false;
        if reason.is_some() {
            self.disconnect_reason = reason;
        }
    }
}

/// One user's session with one channel.
pub struct ChannelSession {
    api: Arc<dyn ChannelApi>,
    settings: ClientSettings,
    credentials: Arc<dyn CredentialStore>,
    phase: SessionPhase,
    pub status: ConnectionStatus,
    pub chat: ChatState,
    pub playlist: PlaylistState,
    pub poll: PollState,
    pub playback: PlaybackState,
}

impl ChannelSession {
    pub fn new(
        api: Arc<dyn ChannelApi>,
        settings: ClientSettings,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let chat = ChatState::new(settings.chat_history_size);
        let playback = PlaybackState::new(settings.sync_threshold_ms);
        Self {
            api,
            settings,
            credentials,
            phase: SessionPhase::Idle,
            status: ConnectionStatus::default(),
            chat,
            playlist: PlaylistState::new(),
            poll: PollState::new(),
            playback,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Target a channel, or clear the target.
    ///
    /// Switching tears down the previous connection first, which cancels
    /// any in-flight join/login/queue for the old channel.
    pub async fn set_channel(&mut self, channel: Option<String>) {
        self.api.disconnect();
        self.settings.channel = channel.clone();
        self.status.has_connected_before = false;
        // An explicit user action lifts the kick suppression.
        self.status.kicked = false;
        self.status.disconnect_reason = None;
        self.status.disconnect(None);
        self.reset_all();

        match channel {
            None => self.phase = SessionPhase::Idle,
            Some(name) => self.connect_flow(&name).await,
        }
    }

    async fn connect_flow(&mut self, channel: &str) {
        self.phase = SessionPhase::Resolving;
        let endpoint = match self.api.resolve(channel).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::error!("failed to resolve a partition for '{}': {}", channel, e);
                self.fail(format!("Can't find a server for channel '{}'", channel));
                return;
            }
        };

        self.phase = SessionPhase::Connecting;
        if let Err(e) = self.api.connect(&endpoint).await {
            tracing::error!("failed to connect to {}: {}", endpoint.url, e);
            self.fail("Can't connect to the server".to_string());
        }
        // The join is sent once the transport reports the session is up.
    }

    fn fail(&mut self, reason: String) {
        self.status.disconnect(Some(reason));
        self.phase = SessionPhase::Disconnected;
    }

    /// Apply one channel event. Events must be fed in arrival order.
    pub async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.on_transport_connect().await,
            ChannelEvent::ConnectError => {
                self.fail("Can't connect to the server".to_string());
            }
            ChannelEvent::Disconnected => self.disconnected(),
            ChannelEvent::UserInitiatedDisconnect => {
                self.status.has_connected_before = false;
                self.disconnected();
            }
            ChannelEvent::Kicked { reason } => self.kicked(reason),

            ChannelEvent::Chat {
                timestamp,
                username,
                message,
            } => self.chat.add_user_message(timestamp, username, message),
            ChannelEvent::LoginSucceeded { name, guest } => {
                self.status.current_user = Some(name);
                self.status.is_guest = guest;
            }

            ChannelEvent::EmoteList(emotes) => self.chat.set_emotes(emotes),
            ChannelEvent::EmoteUpdated(emote) => self.chat.update_emote(emote),
            ChannelEvent::EmoteRemoved(emote) => self.chat.remove_emote(&emote),

            ChannelEvent::UserList(users) => self.chat.users.set_users(users),
            ChannelEvent::UserCount(count) => self.chat.users.set_count(count),
            ChannelEvent::UserAfk { name, afk } => self.chat.users.set_afk(&name, afk),
            ChannelEvent::UserJoined(user) => self.chat.users.add_user(user),
            ChannelEvent::UserLeft { name } => self.chat.users.remove_user(&name),

            ChannelEvent::MediaChanged(media) => self.playback.set_media(Some(media)),
            ChannelEvent::MediaUpdate { time_ms, paused } => self.playback.sync(time_ms, paused),

            ChannelEvent::PlaylistSnapshot(items) => self.playlist.set_playlist(items),
            ChannelEvent::PlaylistQueued { item, anchor } => self.playlist.insert(item, anchor),
            ChannelEvent::PlaylistMeta {
                raw_seconds,
                count,
                time,
            } => self.playlist.set_meta(raw_seconds, count, time),
            ChannelEvent::PlaylistItemDeleted { uid } => self.playlist.delete(uid),
            ChannelEvent::PlaylistMoved { uid, anchor } => self.playlist.move_item(uid, anchor),
            ChannelEvent::PlaylistLocked(locked) => self.playlist.set_locked(locked),

            ChannelEvent::PollOpened(poll) => {
                self.chat
                    .add_announcement(format!("{} opened a poll: {}", poll.initiator, poll.title));
                self.poll.start_new(poll);
            }
            ChannelEvent::PollUpdated(poll) => self.poll.update(poll),
            ChannelEvent::PollClosed => self.poll.close_current(),
        }
    }

    /// Transport-level (re)connect is the only automatic retry path: if a
    /// target channel is set, nothing is joined, and we were not kicked,
    /// re-run join and login.
    async fn on_transport_connect(&mut self) {
        let Some(channel) = self.settings.channel.clone() else {
            return;
        };
        if self.status.current_channel.is_some() {
            // Already joined; a duplicate connect event is a no-op.
            return;
        }
        if self.status.kicked {
            tracing::info!("kicked from '{}', waiting for the user before rejoining", channel);
            return;
        }
        self.join_and_login(&channel).await;
    }

    async fn join_and_login(&mut self, channel: &str) {
        match self.api.join_channel(channel).await {
            Ok(()) => self.joined_channel(channel),
            Err(e) => {
                tracing::error!("failed to join '{}': {}", channel, e);
                self.fail(e.to_string());
                return;
            }
        }
        self.auto_login().await;
        self.phase = SessionPhase::Active;
    }

    fn joined_channel(&mut self, channel: &str) {
        self.status.has_connected_before = true;
        self.status.current_channel = Some(channel.to_string());
        self.status.disconnect_reason = None;
        self.chat
            .add_connection_message("Connected", ConnectionKind::Connected);
        self.phase = SessionPhase::Joined;
    }

    /// Log in with stored credentials, if there are any. A failure never
    /// blocks the session; it drops the stored username instead.
    async fn auto_login(&mut self) {
        let Some(username) = self.settings.username.clone() else {
            return;
        };
        let Some(password) = self.credentials.load_password(&username) else {
            return;
        };

        self.phase = SessionPhase::Authenticating;
        match self.api.login(&username, Some(password)).await {
            Ok(reply) => {
                self.status.current_user = Some(reply.name);
                self.status.is_guest = reply.guest;
            }
            Err(e) => {
                tracing::error!("stored login as '{}' failed: {}", username, e);
                self.settings.username = None;
            }
        }
    }

    fn disconnected(&mut self) {
        self.status.disconnect(None);
        if !self.status.has_connected_before {
            self.reset_all();
        } else if !self.status.kicked {
            self.chat
                .add_connection_message("Disconnected", ConnectionKind::Disconnected);
        }
        if self.phase != SessionPhase::Idle {
            self.phase = SessionPhase::Disconnected;
        }
    }

    fn kicked(&mut self, reason: String) {
        self.status.kicked = true;
        self.chat.add_connection_message(
            format!("Kicked: {}", reason),
            ConnectionKind::Disconnected,
        );
        self.status.disconnect(None);
        self.phase = SessionPhase::Disconnected;
    }

    fn reset_all(&mut self) {
        self.chat.reset();
        self.playlist.reset();
        self.poll.reset();
        // The synchronizer is replaced, never reused, across a full reset.
        self.playback = PlaybackState::new(self.settings.sync_threshold_ms);
    }

    pub fn send_chat(&self, message: &str) {
        self.api.send_message(message);
    }

    /// Vote in the current poll and remember the choice locally.
    pub fn vote(&mut self, option_index: usize) {
        self.api.vote(option_index);
        self.poll.choose(option_index);
    }

    /// User scrubbed the timeline; treated exactly like a server
    /// correction downstream.
    pub fn local_seek(&mut self, time_ms: i64) {
        self.playback.seek_to(time_ms);
    }

    /// Forget the stored account and its password.
    pub fn logout(&mut self) {
        if let Some(username) = self.settings.username.take() {
            self.credentials.delete_password(&username);
        }
        self.status.current_user = None;
        self.status.is_guest = false;
    }

    fn answer(&self, query: SessionQuery) {
        match query {
            SessionQuery::Status(reply) => {
                let _ = reply.send(StatusSnapshot {
                    phase: self.phase,
                    channel: self.status.current_channel.clone(),
                    user: self.status.current_user.clone(),
                    guest: self.status.is_guest,
                    kicked: self.status.kicked,
                    disconnect_reason: self.status.disconnect_reason.clone(),
                    media: self.playback.media().cloned(),
                    position_ms: self.playback.time_ms(),
                    playing: self.playback.is_playing(),
                });
            }
            SessionQuery::Users(reply) => {
                let _ = reply.send(self.chat.users.users().to_vec());
            }
            SessionQuery::Playlist(reply) => {
                let _ = reply.send(PlaylistSnapshot {
                    items: self.playlist.items().to_vec(),
                    count: self.playlist.count(),
                    time: self.playlist.time().to_string(),
                    locked: self.playlist.is_locked(),
                });
            }
            SessionQuery::Poll(reply) => {
                let snapshot = self.poll.current().map(|poll| PollSnapshot {
                    title: poll.title.clone(),
                    initiator: poll.initiator.clone(),
                    total_count: poll.total_count,
                    options: poll.options.clone(),
                    closed: self.poll.is_closed(),
                    chosen_option: self.poll.chosen_option(),
                });
                let _ = reply.send(snapshot);
            }
        }
    }
}

// ========================================
// Actor plumbing
// ========================================

/// Commands a front end can send to a running session.
#[derive(Debug)]
pub enum SessionCommand {
    SetChannel(Option<String>),
    SendChat(String),
    Vote(usize),
    LocalSeek(i64),
    Logout,
    Shutdown,
}

/// Read-only queries answered with a snapshot.
#[derive(Debug)]
pub enum SessionQuery {
    Status(oneshot::Sender<StatusSnapshot>),
    Users(oneshot::Sender<Vec<User>>),
    Playlist(oneshot::Sender<PlaylistSnapshot>),
    Poll(oneshot::Sender<Option<PollSnapshot>>),
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub phase: SessionPhase,
    pub channel: Option<String>,
    pub user: Option<String>,
    pub guest: bool,
    pub kicked: bool,
    pub disconnect_reason: Option<String>,
    pub media: Option<MediaRef>,
    pub position_ms: i64,
    pub playing: bool,
}

#[derive(Debug, Clone)]
pub struct PlaylistSnapshot {
    pub items: Vec<PlaylistItem>,
    pub count: u32,
    pub time: String,
    pub locked: bool,
}

#[derive(Debug, Clone)]
pub struct PollSnapshot {
    pub title: String,
    pub initiator: String,
    pub total_count: u32,
    pub options: Vec<PollOption>,
    pub closed: bool,
    pub chosen_option: Option<usize>,
}

enum SessionInput {
    Event(ChannelEvent),
    Command(SessionCommand),
    Query(SessionQuery),
}

/// Cheap handle for talking to the session actor.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionInput>,
}

impl SessionHandle {
    pub fn set_channel(&self, channel: Option<String>) {
        self.command(SessionCommand::SetChannel(channel));
    }

    pub fn send_chat(&self, message: String) {
        self.command(SessionCommand::SendChat(message));
    }

    pub fn vote(&self, option_index: usize) {
        self.command(SessionCommand::Vote(option_index));
    }

    pub fn local_seek(&self, time_ms: i64) {
        self.command(SessionCommand::LocalSeek(time_ms));
    }

    pub fn logout(&self) {
        self.command(SessionCommand::Logout);
    }

    pub fn shutdown(&self) {
        self.command(SessionCommand::Shutdown);
    }

    pub async fn status(&self) -> Option<StatusSnapshot> {
        self.query(SessionQuery::Status).await
    }

    pub async fn users(&self) -> Option<Vec<User>> {
        self.query(SessionQuery::Users).await
    }

    pub async fn playlist(&self) -> Option<PlaylistSnapshot> {
        self.query(SessionQuery::Playlist).await
    }

    pub async fn poll(&self) -> Option<Option<PollSnapshot>> {
        self.query(SessionQuery::Poll).await
    }

    fn command(&self, command: SessionCommand) {
        if self.tx.send(SessionInput::Command(command)).is_err() {
            tracing::warn!("session actor is gone, dropping command");
        }
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionQuery) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SessionInput::Query(make(tx))).is_err() {
            return None;
        }
        rx.await.ok()
    }
}

/// Forwards protocol events into the session mailbox. This is the only
/// listener that touches session state, and it does so indirectly: the
/// actor task is the single writer.
struct EventForwarder {
    tx: mpsc::UnboundedSender<SessionInput>,
}

impl ChannelEventListener for EventForwarder {
    fn on_event(&self, event: &ChannelEvent) {
        let _ = self.tx.send(SessionInput::Event(event.clone()));
    }
}

/// Start a session actor wired to `client` and return its handle.
pub fn spawn_session(
    client: &CytubeClient,
    settings: ClientSettings,
    credentials: Arc<dyn CredentialStore>,
) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    client.add_event_listener(Arc::new(EventForwarder { tx: tx.clone() }));

    let api: Arc<dyn ChannelApi> = Arc::new(client.clone());
    let session = ChannelSession::new(api, settings, credentials);
    let task = tokio::spawn(run_session(session, rx));

    (SessionHandle { tx }, task)
}

async fn run_session(
    mut session: ChannelSession,
    mut rx: mpsc::UnboundedReceiver<SessionInput>,
) {
    while let Some(input) = rx.recv().await {
        match input {
            SessionInput::Event(event) => session.handle_event(event).await,
            SessionInput::Command(command) => match command {
                SessionCommand::SetChannel(channel) => session.set_channel(channel).await,
                SessionCommand::SendChat(message) => session.send_chat(&message),
                SessionCommand::Vote(option) => session.vote(option),
                SessionCommand::LocalSeek(time_ms) => session.local_seek(time_ms),
                SessionCommand::Logout => session.logout(),
                SessionCommand::Shutdown => break,
            },
            SessionInput::Query(query) => session.answer(query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MediaKind, Poll, PollOption};
    use crate::protocol::client::MockChannelApi;
    use crate::protocol::{LoginReply, RequestError};
    use crate::resolver::{Endpoint, ResolveError};
    use crate::settings::MemoryCredentialStore;
    use chanoma_shared::time::datetime_from_millis;

    fn endpoint() -> Endpoint {
        Endpoint {
            url: "http://127.0.0.1:1".to_string(),
            secure: false,
        }
    }

    fn settings(channel: Option<&str>, username: Option<&str>) -> ClientSettings {
        ClientSettings {
            channel: channel.map(str::to_string),
            username: username.map(str::to_string),
            ..ClientSettings::default()
        }
    }

    fn session_with(
        mock: MockChannelApi,
        settings: ClientSettings,
        credentials: MemoryCredentialStore,
    ) -> ChannelSession {
        ChannelSession::new(Arc::new(mock), settings, Arc::new(credentials))
    }

    fn happy_mock(expected_joins: usize) -> MockChannelApi {
        let mut mock = MockChannelApi::new();
        mock.expect_disconnect().return_const(());
        mock.expect_resolve().returning(|_| Ok(endpoint()));
        mock.expect_connect().returning(|_| Ok(()));
        mock.expect_join_channel()
            .times(expected_joins)
            .returning(|_| Ok(()));
        mock
    }

    #[tokio::test]
    async fn test_initial_connect_joins_on_transport_connect() {
        // テスト項目: チャンネル設定→接続→join の一連の流れで Active になる
        // given (前提条件):
        let mock = happy_mock(1);
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());

        // when (操作):
        session.set_channel(Some("lounge".to_string())).await;
        assert_eq!(session.phase(), SessionPhase::Connecting);
        session.handle_event(ChannelEvent::Connected).await;

        // then (期待する結果):
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.status.current_channel.as_deref(), Some("lounge"));
        assert!(session.status.has_connected_before);
        assert!(session.status.disconnect_reason.is_none());
        assert_eq!(session.chat.messages().len(), 1, "Connected notice");
    }

    #[tokio::test]
    async fn test_resolver_failure_disconnects_with_reason() {
        // テスト項目: パーティション解決の失敗が切断理由になる
        // given (前提条件):
        let mut mock = MockChannelApi::new();
        mock.expect_disconnect().return_const(());
        mock.expect_resolve()
            .returning(|_| Err(ResolveError::NoServers("lounge".to_string())));
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());

        // when (操作):
        session.set_channel(Some("lounge".to_string())).await;

        // then (期待する結果):
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(
            session
                .status
                .disconnect_reason
                .as_deref()
                .unwrap()
                .contains("Can't find a server")
        );
    }

    #[tokio::test]
    async fn test_join_failure_surfaces_reason_and_keeps_target() {
        // テスト項目: join の失敗は理由を表示しつつ、次回の再接続に備えて対象チャンネルを保持する
        // given (前提条件):
        let mut mock = MockChannelApi::new();
        mock.expect_disconnect().return_const(());
        mock.expect_resolve().returning(|_| Ok(endpoint()));
        mock.expect_connect().returning(|_| Ok(()));
        mock.expect_join_channel().returning(|_| {
            Err(RequestError::Rejected("Invalid channel name xyz".to_string()))
        });
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());

        // when (操作):
        session.set_channel(Some("xyz".to_string())).await;
        session.handle_event(ChannelEvent::Connected).await;

        // then (期待する結果):
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert_eq!(
            session.status.disconnect_reason.as_deref(),
            Some("Invalid channel name xyz")
        );
        assert_eq!(session.settings().channel.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_auto_login_success_sets_confirmed_name() {
        // テスト項目: 保存された認証情報で自動ログインし、サーバー確定の名前が入る
        // given (前提条件):
        let mut mock = happy_mock(1);
        mock.expect_login()
            .withf(|username, password| username == "alice" && password.as_deref() == Some("secret"))
            .times(1)
            .returning(|_, _| {
                Ok(LoginReply {
                    name: "Alice".to_string(),
                    guest: false,
                })
            });
        let credentials = MemoryCredentialStore::new();
        credentials.store_password("alice", "secret");
        let mut session = session_with(mock, settings(None, Some("alice")), credentials);

        // when (操作):
        session.set_channel(Some("lounge".to_string())).await;
        session.handle_event(ChannelEvent::Connected).await;

        // then (期待する結果):
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.status.current_user.as_deref(), Some("Alice"));
        assert!(session.status.connected_and_authenticated());
    }

    #[tokio::test]
    async fn test_auto_login_failure_clears_username_but_not_session() {
        // テスト項目: 自動ログインの失敗はセッションを止めず、保存ユーザー名だけを消す
        // given (前提条件):
        let mut mock = happy_mock(1);
        mock.expect_login()
            .returning(|_, _| Err(RequestError::Rejected("Invalid password".to_string())));
        let credentials = MemoryCredentialStore::new();
        credentials.store_password("alice", "wrong");
        let mut session = session_with(mock, settings(None, Some("alice")), credentials);

        // when (操作):
        session.set_channel(Some("lounge".to_string())).await;
        session.handle_event(ChannelEvent::Connected).await;

        // then (期待する結果):
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.status.current_user, None);
        assert_eq!(session.settings().username, None);
        assert_eq!(session.status.current_channel.as_deref(), Some("lounge"));
    }

    #[tokio::test]
    async fn test_kick_suppresses_auto_rejoin() {
        // テスト項目: キック後は transport の再接続でも自動 join しない
        // given (前提条件):
        let mock = happy_mock(1); // join はキック前の一回だけ許可される
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());
        session.set_channel(Some("lounge".to_string())).await;
        session.handle_event(ChannelEvent::Connected).await;
        assert_eq!(session.phase(), SessionPhase::Active);

        // when (操作):
        session
            .handle_event(ChannelEvent::Kicked {
                reason: "spam".to_string(),
            })
            .await;
        session.handle_event(ChannelEvent::Connected).await;

        // then (期待する結果):
        assert!(session.status.kicked);
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert_eq!(session.status.current_channel, None);
        assert!(session.chat.messages().iter().any(|message| matches!(
            message,
            crate::domain::ChatMessage::Connection { message, .. } if message == "Kicked: spam"
        )));
    }

    #[tokio::test]
    async fn test_network_drop_allows_auto_rejoin() {
        // テスト項目: ネットワーク切断後の transport 再接続で自動 join する
        // given (前提条件):
        let mock = happy_mock(2);
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());
        session.set_channel(Some("lounge".to_string())).await;
        session.handle_event(ChannelEvent::Connected).await;

        // when (操作):
        session.handle_event(ChannelEvent::Disconnected).await;
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        session.handle_event(ChannelEvent::Connected).await;

        // then (期待する結果):
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.status.current_channel.as_deref(), Some("lounge"));
        assert!(session.chat.messages().iter().any(|message| matches!(
            message,
            crate::domain::ChatMessage::Connection { message, .. } if message == "Disconnected"
        )));
    }

    #[tokio::test]
    async fn test_duplicate_connect_event_is_idempotent() {
        // テスト項目: join 済みの状態での connect イベントは no-op になる
        // given (前提条件):
        let mock = happy_mock(1);
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());
        session.set_channel(Some("lounge".to_string())).await;
        session.handle_event(ChannelEvent::Connected).await;

        // when (操作):
        session.handle_event(ChannelEvent::Connected).await;

        // then (期待する結果):
        // join_channel の times(1) が守られていればテストは成功する
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[tokio::test]
    async fn test_clearing_channel_resets_everything() {
        // テスト項目: チャンネル解除で全派生状態がリセットされ Idle に戻る
        // given (前提条件):
        let mock = happy_mock(1);
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());
        session.set_channel(Some("lounge".to_string())).await;
        session.handle_event(ChannelEvent::Connected).await;
        session
            .handle_event(ChannelEvent::Chat {
                timestamp: datetime_from_millis(1000),
                username: "alice".to_string(),
                message: "hi".to_string(),
            })
            .await;

        // when (操作):
        session.set_channel(None).await;

        // then (期待する結果):
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.chat.messages().is_empty());
        assert_eq!(session.status.current_channel, None);
        assert_eq!(session.settings().channel, None);
    }

    #[tokio::test]
    async fn test_media_events_drive_playback() {
        // テスト項目: メディアイベントが再生状態に反映される
        // given (前提条件):
        let mut mock = MockChannelApi::new();
        mock.expect_disconnect().return_const(());
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());

        // when (操作):
        session
            .handle_event(ChannelEvent::MediaChanged(MediaRef {
                kind: MediaKind::YouTube,
                id: "ABC123".to_string(),
            }))
            .await;
        session
            .handle_event(ChannelEvent::MediaUpdate {
                time_ms: 60_000,
                paused: false,
            })
            .await;

        // then (期待する結果):
        assert_eq!(session.playback.media().unwrap().id, "ABC123");
        assert_eq!(session.playback.time_ms(), 60_000);
        assert!(session.playback.is_playing());
    }

    #[tokio::test]
    async fn test_new_poll_announces_in_chat() {
        // テスト項目: 新しい投票の開始がチャットに告知される
        // given (前提条件):
        let mut mock = MockChannelApi::new();
        mock.expect_disconnect().return_const(());
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());
        let poll = Poll {
            title: "Next video?".to_string(),
            initiator: "alice".to_string(),
            opened_at: datetime_from_millis(1000),
            total_count: 0,
            options: vec![PollOption {
                name: "this one".to_string(),
                count: 0,
                index: 0,
            }],
        };

        // when (操作):
        session.handle_event(ChannelEvent::PollOpened(poll)).await;

        // then (期待する結果):
        assert!(session.poll.current().is_some());
        assert!(session.chat.messages().iter().any(|message| matches!(
            message,
            crate::domain::ChatMessage::Announcement { message }
                if message == "alice opened a poll: Next video?"
        )));
    }

    #[tokio::test]
    async fn test_vote_forwards_and_records_choice() {
        // テスト項目: 投票がサーバーに送られ、選択が記録される
        // given (前提条件):
        let mut mock = MockChannelApi::new();
        mock.expect_disconnect().return_const(());
        mock.expect_vote()
            .withf(|option| *option == 2)
            .times(1)
            .return_const(());
        let mut session = session_with(mock, settings(None, None), MemoryCredentialStore::new());

        // when (操作):
        session.vote(2);

        // then (期待する結果):
        assert_eq!(session.poll.chosen_option(), Some(2));
    }

    #[tokio::test]
    async fn test_logout_deletes_stored_password() {
        // テスト項目: ログアウトで保存されたパスワードと名前が消える
        // given (前提条件):
        let mut mock = MockChannelApi::new();
        mock.expect_disconnect().return_const(());
        let credentials = MemoryCredentialStore::new();
        credentials.store_password("alice", "secret");
        let credentials = Arc::new(credentials);
        let mut session = ChannelSession::new(
            Arc::new(mock),
            settings(None, Some("alice")),
            credentials.clone(),
        );
        session.status.current_user = Some("Alice".to_string());

        // when (操作):
        session.logout();

        // then (期待する結果):
        assert_eq!(session.settings().username, None);
        assert_eq!(session.status.current_user, None);
        assert_eq!(credentials.load_password("alice"), None);
    }
}
