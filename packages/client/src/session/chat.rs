//! Chat state: message log, emote map, and the user roster.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{ChatMessage, ConnectionKind, Emote, User};

/// The chat log and everything rendered alongside it.
pub struct ChatState {
    messages: Vec<ChatMessage>,
    history_size: usize,
    last_user_message_at: Option<DateTime<Utc>>,
    emotes: HashMap<String, Emote>,
    pub users: UserRoster,
}

impl ChatState {
    pub fn new(history_size: usize) -> Self {
        Self {
            messages: Vec::new(),
            history_size: history_size.max(1),
            last_user_message_at: None,
            emotes: HashMap::new(),
            users: UserRoster::default(),
        }
    }

    /// Append a user message, discarding replays.
    ///
    /// On rejoin the server resends recent history; anything not strictly
    /// newer than the last seen user message is dropped.
    pub fn add_user_message(&mut self, timestamp: DateTime<Utc>, username: String, message: String) {
        if let Some(last) = self.last_user_message_at
            && timestamp <= last
        {
            return;
        }
        self.last_user_message_at = Some(timestamp);
        self.push(ChatMessage::User {
            timestamp,
            username,
            message,
        });
    }

    pub fn add_system_message(&mut self, message: impl Into<String>) {
        self.push(ChatMessage::System {
            message: message.into(),
        });
    }

    pub fn add_announcement(&mut self, message: impl Into<String>) {
        self.push(ChatMessage::Announcement {
            message: message.into(),
        });
    }

    pub fn add_connection_message(&mut self, message: impl Into<String>, kind: ConnectionKind) {
        self.push(ChatMessage::Connection {
            message: message.into(),
            kind,
        });
    }

    fn push(&mut self, message: ChatMessage) {
        while self.messages.len() >= self.history_size {
            self.messages.remove(0);
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn set_emotes(&mut self, emotes: Vec<Emote>) {
        self.emotes = emotes
            .into_iter()
            .map(|emote| (emote.name.clone(), emote))
            .collect();
    }

    pub fn update_emote(&mut self, emote: Emote) {
        let verb = if self.emotes.contains_key(&emote.name) {
            "updated"
        } else {
            "added"
        };
        self.add_system_message(format!("Emote {} was {}", emote.name, verb));
        self.emotes.insert(emote.name.clone(), emote);
    }

    pub fn remove_emote(&mut self, emote: &Emote) {
        if self.emotes.remove(&emote.name).is_some() {
            self.add_system_message(format!("Emote {} was removed", emote.name));
        }
    }

    pub fn emotes(&self) -> &HashMap<String, Emote> {
        &self.emotes
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.last_user_message_at = None;
        self.emotes.clear();
        self.users = UserRoster::default();
    }
}

/// Who is in the channel right now.
///
/// The roster is kept sorted by rank, highest first (stable within a
/// rank); the server's user count includes anonymous viewers the roster
/// never sees.
#[derive(Default)]
pub struct UserRoster {
    users: Vec<User>,
    user_count: u32,
}

impl UserRoster {
    pub fn set_users(&mut self, users: Vec<User>) {
        self.users = users;
        self.sort();
    }

    pub fn add_user(&mut self, user: User) {
        self.users.retain(|existing| existing.name != user.name);
        self.users.push(user);
        self.sort();
    }

    pub fn remove_user(&mut self, name: &str) {
        self.users.retain(|user| user.name != name);
    }

    pub fn set_afk(&mut self, name: &str, afk: bool) {
        if let Some(user) = self.users.iter_mut().find(|user| user.name == name) {
            user.afk = afk;
        }
    }

    pub fn set_count(&mut self, count: u32) {
        self.user_count = count;
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user_count(&self) -> u32 {
        self.user_count
    }

    /// Viewers connected without appearing in the roster.
    pub fn anonymous(&self) -> u32 {
        self.user_count.saturating_sub(self.users.len() as u32)
    }

    fn sort(&mut self) {
        self.users.sort_by(|a, b| b.rank.cmp(&a.rank));
    }
}
