//! Playlist state.
//!
//! Ordering is server-authoritative: the list is only mutated by explicit
//! snapshot, insert, move, and delete events and is never re-sorted
//! locally. Events referring to unknown uids are logged and applied as
//! conservatively as possible instead of panicking; the next snapshot
//! resynchronizes everything.

use crate::domain::{PlaylistAnchor, PlaylistItem};

#[derive(Default)]
pub struct PlaylistState {
    items: Vec<PlaylistItem>,
    /// Total runtime of the playlist in seconds.
    raw_seconds: i64,
    count: u32,
    /// Server-formatted total runtime, e.g. "1:23:45".
    time: String,
    locked: bool,
}

impl PlaylistState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole playlist with a server snapshot.
    pub fn set_playlist(&mut self, items: Vec<PlaylistItem>) {
        self.items = items;
    }

    /// Insert an entry where the server anchored it.
    pub fn insert(&mut self, item: PlaylistItem, anchor: PlaylistAnchor) {
        match anchor {
            PlaylistAnchor::Start => self.items.insert(0, item),
            PlaylistAnchor::After(after_uid) => match self.position_of(after_uid) {
                Some(index) => self.items.insert(index + 1, item),
                None => {
                    tracing::warn!(
                        "insert anchor uid {} not found, appending uid {}",
                        after_uid,
                        item.uid
                    );
                    self.items.push(item);
                }
            },
        }
    }

    pub fn delete(&mut self, uid: i64) {
        let before = self.items.len();
        self.items.retain(|item| item.uid != uid);
        if self.items.len() == before {
            tracing::warn!("delete for unknown playlist uid {}", uid);
        }
    }

    /// Move an entry to where the server anchored it.
    pub fn move_item(&mut self, uid: i64, anchor: PlaylistAnchor) {
        let Some(from) = self.position_of(uid) else {
            tracing::warn!("move for unknown playlist uid {}", uid);
            return;
        };
        let item = self.items.remove(from);
        match anchor {
            PlaylistAnchor::Start => self.items.insert(0, item),
            PlaylistAnchor::After(after_uid) => match self.position_of(after_uid) {
                Some(index) => self.items.insert(index + 1, item),
                None => {
                    tracing::warn!("move anchor uid {} not found, restoring position", after_uid);
                    self.items.insert(from.min(self.items.len()), item);
                }
            },
        }
    }

    pub fn set_meta(&mut self, raw_seconds: i64, count: u32, time: String) {
        self.raw_seconds = raw_seconds;
        self.count = count;
        self.time = time;
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn raw_seconds(&self) -> i64 {
        self.raw_seconds
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn position_of(&self, uid: i64) -> Option<usize> {
        self.items.iter().position(|item| item.uid == uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MediaItem, MediaKind};

    fn item(uid: i64) -> PlaylistItem {
        PlaylistItem {
            uid,
            temp: false,
            queued_by: "alice".to_string(),
            media: MediaItem {
                id: format!("video-{}", uid),
                title: format!("Video {}", uid),
                kind: MediaKind::YouTube,
                duration: "03:00".to_string(),
                seconds: 180,
            },
        }
    }

    fn uids(playlist: &PlaylistState) -> Vec<i64> {
        playlist.items().iter().map(|item| item.uid).collect()
    }

    #[test]
    fn test_insert_after_uid() {
        // テスト項目: 指定 uid の直後に挿入される
        // given (前提条件):
        let mut playlist = PlaylistState::new();
        playlist.set_playlist(vec![item(1), item(2), item(3)]);

        // when (操作):
        playlist.insert(item(9), PlaylistAnchor::After(2));

        // then (期待する結果):
        assert_eq!(uids(&playlist), vec![1, 2, 9, 3]);
    }

    #[test]
    fn test_insert_at_start() {
        // テスト項目: prepend アンカーで先頭に挿入される
        // given (前提条件):
        let mut playlist = PlaylistState::new();
        playlist.set_playlist(vec![item(1), item(2)]);

        // when (操作):
        playlist.insert(item(9), PlaylistAnchor::Start);

        // then (期待する結果):
        assert_eq!(uids(&playlist), vec![9, 1, 2]);
    }

    #[test]
    fn test_insert_with_unknown_anchor_appends() {
        // テスト項目: 未知のアンカー uid への挿入は末尾に追加される
        // given (前提条件):
        let mut playlist = PlaylistState::new();
        playlist.set_playlist(vec![item(1)]);

        // when (操作):
        playlist.insert(item(9), PlaylistAnchor::After(42));

        // then (期待する結果):
        assert_eq!(uids(&playlist), vec![1, 9]);
    }

    #[test]
    fn test_delete_by_uid() {
        // テスト項目: uid 指定でエントリが削除される
        // given (前提条件):
        let mut playlist = PlaylistState::new();
        playlist.set_playlist(vec![item(1), item(2), item(3)]);

        // when (操作):
        playlist.delete(2);

        // then (期待する結果):
        assert_eq!(uids(&playlist), vec![1, 3]);
    }

    #[test]
    fn test_move_after_uid() {
        // テスト項目: エントリが指定 uid の直後に移動する
        // given (前提条件):
        let mut playlist = PlaylistState::new();
        playlist.set_playlist(vec![item(1), item(2), item(3), item(4)]);

        // when (操作):
        playlist.move_item(1, PlaylistAnchor::After(3));

        // then (期待する結果):
        assert_eq!(uids(&playlist), vec![2, 3, 1, 4]);
    }

    #[test]
    fn test_move_to_start() {
        // テスト項目: エントリが先頭に移動する
        // given (前提条件):
        let mut playlist = PlaylistState::new();
        playlist.set_playlist(vec![item(1), item(2), item(3)]);

        // when (操作):
        playlist.move_item(3, PlaylistAnchor::Start);

        // then (期待する結果):
        assert_eq!(uids(&playlist), vec![3, 1, 2]);
    }

    #[test]
    fn test_move_unknown_uid_is_ignored() {
        // テスト項目: 未知の uid の移動は無視される
        // given (前提条件):
        let mut playlist = PlaylistState::new();
        playlist.set_playlist(vec![item(1), item(2)]);

        // when (操作):
        playlist.move_item(42, PlaylistAnchor::Start);

        // then (期待する結果):
        assert_eq!(uids(&playlist), vec![1, 2]);
    }

    #[test]
    fn test_reset_clears_everything() {
        // テスト項目: リセットで全状態が初期化される
        // given (前提条件):
        let mut playlist = PlaylistState::new();
        playlist.set_playlist(vec![item(1)]);
        playlist.set_meta(180, 1, "03:00".to_string());
        playlist.set_locked(true);

        // when (操作):
        playlist.reset();

        // then (期待する結果):
        assert!(playlist.items().is_empty());
        assert_eq!(playlist.count(), 0);
        assert_eq!(playlist.time(), "");
        assert!(!playlist.is_locked());
    }
}
