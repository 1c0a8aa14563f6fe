//! Client library for CyTube-style synchronized watching channels.
//!
//! A channel on the remote service combines a chat room with a
//! server-driven video timeline: everyone connected to the channel sees the
//! same media at the same position. This crate implements the full client
//! side of that protocol:
//!
//! - [`resolver`]: maps a channel name to the partition server hosting it
//! - [`transport`]: the WebSocket connection and its framing
//! - [`protocol`]: typed events, wire payloads, and the protocol client
//!   with request/reply correlation for join, login, and queue
//! - [`session`]: the per-channel state machine plus the chat, playlist,
//!   poll, and playback state it maintains
//! - [`cli`]: the interactive terminal front end used by the `chanoma`
//!   binary
//!
//! Rendering, image handling, and the embedded video players are out of
//! scope; an embedding application observes [`session`] state and drives
//! its own player from the playback timeline.

pub mod cli;
pub mod domain;
pub mod protocol;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod transport;
