//! Typed events decoded from the channel protocol.

use chrono::{DateTime, Utc};

use crate::domain::{Emote, MediaRef, PlaylistAnchor, PlaylistItem, Poll, User};

/// Everything a channel can tell the client, as one tagged type.
///
/// Events are broadcast to listeners synchronously, in registration order,
/// in the order they arrived from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The protocol session is up (initial connect or reconnect).
    Connected,
    /// A connection attempt failed; the transport may retry.
    ConnectError,
    /// The connection was lost unexpectedly.
    Disconnected,
    /// The user asked to disconnect. Emitted before teardown so listeners
    /// can distinguish this from a network drop.
    UserInitiatedDisconnect,
    /// The server removed us from the channel.
    Kicked { reason: String },

    /// A chat message from a user in the channel.
    Chat {
        timestamp: DateTime<Utc>,
        username: String,
        message: String,
    },
    /// The server confirmed a login (possibly a guest login).
    LoginSucceeded { name: String, guest: bool },

    EmoteList(Vec<Emote>),
    EmoteUpdated(Emote),
    EmoteRemoved(Emote),

    UserList(Vec<User>),
    UserCount(u32),
    UserAfk { name: String, afk: bool },
    UserJoined(User),
    UserLeft { name: String },

    /// The channel switched to different media.
    MediaChanged(MediaRef),
    /// Periodic playback position report from the server timeline.
    MediaUpdate { time_ms: i64, paused: bool },

    PlaylistSnapshot(Vec<PlaylistItem>),
    PlaylistQueued {
        item: PlaylistItem,
        anchor: PlaylistAnchor,
    },
    PlaylistMeta {
        raw_seconds: i64,
        count: u32,
        time: String,
    },
    PlaylistItemDeleted { uid: i64 },
    PlaylistMoved { uid: i64, anchor: PlaylistAnchor },
    PlaylistLocked(bool),

    PollOpened(Poll),
    PollUpdated(Poll),
    PollClosed,
}

/// Observer interface for channel events.
///
/// Listeners are registered per client instance and invoked synchronously;
/// a panicking listener is logged and skipped, it never starves the others.
pub trait ChannelEventListener: Send + Sync {
    fn on_event(&self, event: &ChannelEvent);
}
