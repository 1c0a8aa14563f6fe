//! Client configuration and the credential store boundary.
//!
//! The real application persists settings and passwords through platform
//! facilities (a settings file, the OS keyring). This crate only needs the
//! shape of that boundary: a plain settings struct and a [`CredentialStore`]
//! trait with an in-memory implementation for the CLI and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::session::playback::DEFAULT_SYNC_THRESHOLD_MS;

/// Per-user client settings relevant to a channel session.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// The channel the user wants to be in; `None` means no target.
    pub channel: Option<String>,
    /// The account to log in as, when a password is stored for it.
    pub username: Option<String>,
    /// Playback drift above this many milliseconds forces a hard seek.
    pub sync_threshold_ms: i64,
    /// Maximum number of chat messages kept in memory.
    pub chat_history_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            channel: None,
            username: None,
            sync_threshold_ms: DEFAULT_SYNC_THRESHOLD_MS,
            chat_history_size: 1000,
        }
    }
}

/// Password storage boundary, backed by the OS keyring in the real
/// application.
pub trait CredentialStore: Send + Sync {
    fn load_password(&self, username: &str) -> Option<String>;
    fn store_password(&self, username: &str, password: &str);
    fn delete_password(&self, username: &str);
}

/// In-memory credential store for the CLI client and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    passwords: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_password(&self, username: &str) -> Option<String> {
        self.passwords
            .lock()
            .expect("credential store poisoned")
            .get(username)
            .cloned()
    }

    fn store_password(&self, username: &str, password: &str) {
        self.passwords
            .lock()
            .expect("credential store poisoned")
            .insert(username.to_string(), password.to_string());
    }

    fn delete_password(&self, username: &str) {
        self.passwords
            .lock()
            .expect("credential store poisoned")
            .remove(username);
    }
}
