//! Domain model for channels: chat messages, users, emotes, playlist
//! entries, polls, and media references.
//!
//! These types are what the rest of the application works with; the wire
//! payload shapes live in [`crate::protocol::dto`] and are converted here
//! at the protocol boundary.

use chrono::{DateTime, Utc};

/// URL prefix the service uses for YouTube-hosted media.
pub const YOUTUBE_WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// One entry in the chat log.
///
/// Render code matches exhaustively on this, so a new message kind is a
/// compile error everywhere it matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    /// A message typed by a user in the channel.
    User {
        timestamp: DateTime<Utc>,
        username: String,
        message: String,
    },
    /// A client-generated notice, e.g. "Emote pog was added".
    System { message: String },
    /// A channel-wide announcement, e.g. a new poll opening.
    Announcement { message: String },
    /// A connection lifecycle notice.
    Connection {
        message: String,
        kind: ConnectionKind,
    },
}

/// Whether a connection notice reports a connect or a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Connected,
    Disconnected,
}

/// Channel rank tiers the service assigns to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UserRank {
    Guest,
    RegularUser,
    Moderator,
    ChannelAdmin,
    SiteAdmin,
}

impl UserRank {
    /// Map the numeric rank from the wire onto a tier.
    ///
    /// The service uses fractional ranks for sub-tiers (1.5, 5.0, 10.0);
    /// unknown values collapse to `Guest`.
    pub fn from_wire(rank: f64) -> Self {
        if rank == 255.0 {
            UserRank::SiteAdmin
        } else if rank >= 3.0 {
            UserRank::ChannelAdmin
        } else if rank >= 2.0 {
            UserRank::Moderator
        } else if rank >= 1.0 {
            UserRank::RegularUser
        } else {
            UserRank::Guest
        }
    }
}

/// A user currently present in the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,
    pub rank: UserRank,
    pub afk: bool,
    pub muted: bool,
}

/// A channel emote: a short name mapped to an image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emote {
    pub name: String,
    pub image_url: String,
}

/// The hosting type of a piece of media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Hosted on YouTube; the id is the watch-URL suffix.
    YouTube,
    /// A direct file locator played verbatim.
    File,
}

impl MediaKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            MediaKind::YouTube => "yt",
            MediaKind::File => "fi",
        }
    }

    /// Everything that is not YouTube is treated as a direct file.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "yt" => MediaKind::YouTube,
            _ => MediaKind::File,
        }
    }
}

/// Identifies the currently loaded media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub id: String,
}

impl MediaRef {
    /// Derive the media reference for a user-submitted URL.
    ///
    /// A YouTube watch URL is stripped down to its video id; anything else
    /// is submitted verbatim as a file locator.
    pub fn from_url(url: &str) -> Self {
        match url.strip_prefix(YOUTUBE_WATCH_PREFIX) {
            Some(id) => MediaRef {
                kind: MediaKind::YouTube,
                id: id.to_string(),
            },
            None => MediaRef {
                kind: MediaKind::File,
                id: url.to_string(),
            },
        }
    }

    /// The URL a local player can actually open.
    pub fn playable_url(&self) -> String {
        match self.kind {
            MediaKind::YouTube => format!("{}{}", YOUTUBE_WATCH_PREFIX, self.id),
            MediaKind::File => self.id.clone(),
        }
    }
}

/// Media metadata attached to a playlist entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub kind: MediaKind,
    /// Human-readable duration as formatted by the server, e.g. "04:13".
    pub duration: String,
    pub seconds: i64,
}

impl MediaItem {
    pub fn playable_url(&self) -> String {
        MediaRef {
            kind: self.kind,
            id: self.id.clone(),
        }
        .playable_url()
    }
}

/// One entry of the channel playlist. Ordering is server-authoritative.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    /// Server-assigned unique id of this entry.
    pub uid: i64,
    pub temp: bool,
    pub queued_by: String,
    pub media: MediaItem,
}

/// Position anchor for playlist inserts and moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistAnchor {
    /// Place the entry at the head of the playlist.
    Start,
    /// Place the entry directly after the entry with this uid.
    After(i64),
}

/// A poll running (or just closed) in the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Poll {
    pub title: String,
    pub initiator: String,
    pub opened_at: DateTime<Utc>,
    pub total_count: u32,
    pub options: Vec<PollOption>,
}

/// One votable option of a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOption {
    pub name: String,
    pub count: u32,
    pub index: usize,
}
