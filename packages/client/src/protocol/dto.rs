//! Wire payload shapes and their conversion to domain types.
//!
//! Field names follow the service's JSON exactly; everything leaves this
//! module as a domain type or a [`ChannelEvent`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use chanoma_shared::time::datetime_from_millis;

use crate::domain::{
    Emote, MediaItem, MediaKind, MediaRef, PlaylistAnchor, PlaylistItem, Poll, PollOption, User,
    UserRank,
};
use crate::protocol::event::ChannelEvent;

// ========================================
// Outbound payloads
// ========================================

#[derive(Debug, Serialize)]
pub(crate) struct JoinChannelRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pw: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMsgRequest {
    pub msg: String,
    /// Always an empty object on this client; the server uses it for
    /// moderator flair.
    pub meta: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QueueRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub pos: &'static str,
    pub temp: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct VoteRequest {
    pub option: usize,
}

// ========================================
// Inbound payloads
// ========================================

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorMsgDto {
    pub msg: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginDto {
    pub success: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub guest: bool,
}

#[derive(Debug, Deserialize)]
struct ChatMsgDto {
    time: i64,
    username: String,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct EmoteDto {
    name: String,
    image: String,
}

#[derive(Debug, Deserialize)]
struct UserMetaDto {
    #[serde(default)]
    afk: bool,
    #[serde(default)]
    muted: bool,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    name: String,
    rank: f64,
    meta: UserMetaDto,
}

#[derive(Debug, Deserialize)]
struct NameDto {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SetAfkDto {
    name: String,
    afk: bool,
}

#[derive(Debug, Deserialize)]
struct ChangeMediaDto {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaUpdateDto {
    #[serde(rename = "currentTime")]
    current_time: f64,
    paused: bool,
}

#[derive(Debug, Deserialize)]
struct MediaDto {
    id: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
    duration: String,
    seconds: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistItemDto {
    pub uid: i64,
    pub temp: bool,
    pub queueby: String,
    media: MediaDto,
}

impl PlaylistItemDto {
    /// The media id used to correlate queue replies with submissions.
    pub(crate) fn media_id(&self) -> &str {
        &self.media.id
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueDto {
    pub item: PlaylistItemDto,
    #[serde(default)]
    after: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueFailDto {
    pub id: String,
    pub msg: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistMetaDto {
    #[serde(rename = "rawTime")]
    raw_time: i64,
    count: u32,
    time: String,
}

#[derive(Debug, Deserialize)]
struct DeleteDto {
    uid: i64,
}

#[derive(Debug, Deserialize)]
struct MoveVideoDto {
    from: i64,
    after: Value,
}

#[derive(Debug, Deserialize)]
struct KickDto {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct PollDto {
    title: String,
    initiator: String,
    timestamp: i64,
    options: Vec<String>,
    counts: Vec<u32>,
}

// ========================================
// DTO → domain
// ========================================

impl From<EmoteDto> for Emote {
    fn from(dto: EmoteDto) -> Self {
        Self {
            name: dto.name,
            image_url: dto.image,
        }
    }
}

impl From<UserDto> for User {
    fn from(dto: UserDto) -> Self {
        Self {
            name: dto.name,
            rank: UserRank::from_wire(dto.rank),
            afk: dto.meta.afk,
            muted: dto.meta.muted,
        }
    }
}

impl From<MediaDto> for MediaItem {
    fn from(dto: MediaDto) -> Self {
        Self {
            id: dto.id,
            title: dto.title,
            kind: MediaKind::from_wire(&dto.kind),
            duration: dto.duration,
            seconds: dto.seconds,
        }
    }
}

impl From<PlaylistItemDto> for PlaylistItem {
    fn from(dto: PlaylistItemDto) -> Self {
        Self {
            uid: dto.uid,
            temp: dto.temp,
            queued_by: dto.queueby,
            media: dto.media.into(),
        }
    }
}

impl From<PollDto> for Poll {
    fn from(dto: PollDto) -> Self {
        let options = dto
            .options
            .iter()
            .zip(dto.counts.iter())
            .enumerate()
            .map(|(index, (name, count))| PollOption {
                name: unescape_html(name),
                count: *count,
                index,
            })
            .collect();
        Self {
            title: unescape_html(&dto.title),
            initiator: dto.initiator,
            opened_at: datetime_from_millis(dto.timestamp),
            total_count: dto.counts.iter().sum(),
            options,
        }
    }
}

// ========================================
// Event decoding
// ========================================

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode '{name}' payload: {source}")]
    Payload {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{0}' payload has an invalid position anchor")]
    InvalidAnchor(String),
}

fn payload<T: serde::de::DeserializeOwned>(name: &str, value: &Value) -> Result<T, DecodeError> {
    serde_json::from_value(value.clone()).map_err(|source| DecodeError::Payload {
        name: name.to_string(),
        source,
    })
}

/// Parse an insert/move anchor: the literal string `"prepend"`, a uid as a
/// number, or a uid as a numeric string.
fn anchor(value: &Value) -> Option<PlaylistAnchor> {
    match value {
        Value::Number(n) => n.as_i64().map(PlaylistAnchor::After),
        Value::String(s) if s == "prepend" => Some(PlaylistAnchor::Start),
        Value::String(s) => s.parse().ok().map(PlaylistAnchor::After),
        _ => None,
    }
}

/// Decode one named wire event into a [`ChannelEvent`].
///
/// Returns `Ok(None)` for events that carry no listener-facing information
/// (join/queue correlation replies, unknown names). The caller decides what
/// to do about malformed payloads; decoding never panics.
pub(crate) fn decode_event(name: &str, value: &Value) -> Result<Option<ChannelEvent>, DecodeError> {
    let event = match name {
        "chatMsg" => {
            let dto: ChatMsgDto = payload(name, value)?;
            ChannelEvent::Chat {
                timestamp: datetime_from_millis(dto.time),
                username: dto.username,
                message: dto.msg,
            }
        }
        "login" => {
            let dto: LoginDto = payload(name, value)?;
            if !dto.success {
                // Login failures only matter to the awaiting request.
                return Ok(None);
            }
            ChannelEvent::LoginSucceeded {
                name: dto.name.unwrap_or_default(),
                guest: dto.guest,
            }
        }
        "emoteList" => {
            let dtos: Vec<EmoteDto> = payload(name, value)?;
            ChannelEvent::EmoteList(dtos.into_iter().map(Emote::from).collect())
        }
        "updateEmote" => {
            let dto: EmoteDto = payload(name, value)?;
            ChannelEvent::EmoteUpdated(dto.into())
        }
        "removeEmote" => {
            let dto: EmoteDto = payload(name, value)?;
            ChannelEvent::EmoteRemoved(dto.into())
        }
        "userlist" => {
            let dtos: Vec<UserDto> = payload(name, value)?;
            ChannelEvent::UserList(dtos.into_iter().map(User::from).collect())
        }
        "usercount" => ChannelEvent::UserCount(payload(name, value)?),
        "setAFK" => {
            let dto: SetAfkDto = payload(name, value)?;
            ChannelEvent::UserAfk {
                name: dto.name,
                afk: dto.afk,
            }
        }
        "addUser" => {
            let dto: UserDto = payload(name, value)?;
            ChannelEvent::UserJoined(dto.into())
        }
        "userLeave" => {
            let dto: NameDto = payload(name, value)?;
            ChannelEvent::UserLeft { name: dto.name }
        }
        "changeMedia" => {
            let dto: ChangeMediaDto = payload(name, value)?;
            ChannelEvent::MediaChanged(MediaRef {
                kind: MediaKind::from_wire(&dto.kind),
                id: dto.id,
            })
        }
        "mediaUpdate" => {
            let dto: MediaUpdateDto = payload(name, value)?;
            ChannelEvent::MediaUpdate {
                time_ms: (dto.current_time * 1000.0) as i64,
                paused: dto.paused,
            }
        }
        "queue" => {
            let dto: QueueDto = payload(name, value)?;
            let anchor =
                anchor(&dto.after).ok_or_else(|| DecodeError::InvalidAnchor(name.to_string()))?;
            ChannelEvent::PlaylistQueued {
                item: dto.item.into(),
                anchor,
            }
        }
        "playlist" => {
            let dtos: Vec<PlaylistItemDto> = payload(name, value)?;
            ChannelEvent::PlaylistSnapshot(dtos.into_iter().map(PlaylistItem::from).collect())
        }
        "setPlaylistMeta" => {
            let dto: PlaylistMetaDto = payload(name, value)?;
            ChannelEvent::PlaylistMeta {
                raw_seconds: dto.raw_time,
                count: dto.count,
                time: dto.time,
            }
        }
        "delete" => {
            let dto: DeleteDto = payload(name, value)?;
            ChannelEvent::PlaylistItemDeleted { uid: dto.uid }
        }
        "moveVideo" => {
            let dto: MoveVideoDto = payload(name, value)?;
            let anchor =
                anchor(&dto.after).ok_or_else(|| DecodeError::InvalidAnchor(name.to_string()))?;
            ChannelEvent::PlaylistMoved {
                uid: dto.from,
                anchor,
            }
        }
        "setPlaylistLocked" => ChannelEvent::PlaylistLocked(payload(name, value)?),
        "newPoll" => {
            let dto: PollDto = payload(name, value)?;
            ChannelEvent::PollOpened(dto.into())
        }
        "updatePoll" => {
            let dto: PollDto = payload(name, value)?;
            ChannelEvent::PollUpdated(dto.into())
        }
        "closePoll" => ChannelEvent::PollClosed,
        "kick" => {
            let dto: KickDto = payload(name, value)?;
            ChannelEvent::Kicked { reason: dto.reason }
        }
        // Correlation-only replies and anything unrecognized.
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Unescape the HTML entities the server escapes in poll text.
///
/// `&amp;` is replaced last so that a literal `&amp;lt;` comes out as
/// `&lt;` rather than `<`.
pub(crate) fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
