//! Playback timeline synchronization.
//!
//! The server periodically reports the authoritative position and
//! play/pause state of the channel timeline. The local player drifts:
//! buffering, decoder hiccups, and clock skew all pull it away from the
//! server. Correcting every small difference would make playback stutter,
//! so position corrections only happen when the drift exceeds a threshold,
//! while play/pause state always tracks the server exactly.
//!
//! The player adapter reports its own progress through
//! [`PlaybackState::update_internally`] and watches
//! [`PlaybackState::external_update_toggle`]: the toggle flips exactly once
//! per externally driven position change (server correction or user seek),
//! which is the adapter's signal to issue a real seek command. Position
//! changes the player itself reported never flip it, so the adapter never
//! reacts to its own reports.

use crate::domain::MediaRef;

/// Default drift tolerance before a hard seek, in milliseconds.
pub const DEFAULT_SYNC_THRESHOLD_MS: i64 = 2000;

/// The tracked position plus the external-update marker.
#[derive(Debug, Default)]
pub struct TimeState {
    time_ms: i64,
    updated_externally_toggle: bool,
}

impl TimeState {
    /// Externally driven position change: store it and flip the toggle.
    fn update(&mut self, time_ms: i64) {
        self.time_ms = time_ms;
        self.updated_externally_toggle = !self.updated_externally_toggle;
    }

    /// Player-reported position change: store it, leave the toggle alone.
    fn update_internally(&mut self, time_ms: i64) {
        self.time_ms = time_ms;
    }

    pub fn time_ms(&self) -> i64 {
        self.time_ms
    }

    pub fn updated_externally_toggle(&self) -> bool {
        self.updated_externally_toggle
    }
}

/// Local estimate of the channel timeline and the player-facing state
/// derived from it.
#[derive(Debug)]
pub struct PlaybackState {
    time: TimeState,
    playing: bool,
    /// Media length in milliseconds; -1 while unknown.
    length_ms: i64,
    volume: u8,
    muted: bool,
    media: Option<MediaRef>,
    sync_threshold_ms: i64,
}

impl PlaybackState {
    pub fn new(sync_threshold_ms: i64) -> Self {
        Self {
            time: TimeState::default(),
            playing: true,
            length_ms: -1,
            volume: 50,
            muted: false,
            media: None,
            sync_threshold_ms,
        }
    }

    /// Apply a server timeline report.
    ///
    /// Position is corrected only when the drift exceeds the threshold
    /// (hysteresis against stutter); play/pause is binary and always
    /// matches the server.
    pub fn sync(&mut self, server_time_ms: i64, paused: bool) {
        let drift = (server_time_ms - self.time.time_ms()).abs();
        if drift > self.sync_threshold_ms {
            tracing::debug!(
                "drift {} ms exceeds threshold {} ms, seeking to {}",
                drift,
                self.sync_threshold_ms,
                server_time_ms
            );
            self.time.update(server_time_ms);
        }

        if !paused && !self.playing {
            self.play();
        } else if paused && self.playing {
            self.pause();
        }
    }

    /// User-initiated seek. Identical to a server correction from the
    /// player adapter's point of view.
    pub fn seek_to(&mut self, time_ms: i64) {
        self.time.update(time_ms);
    }

    /// Natural playback heartbeat from the player adapter.
    pub fn update_internally(&mut self, time_ms: i64) {
        self.time.update_internally(time_ms);
    }

    /// Replace the loaded media. Playback restarts as playing; the
    /// position is left for the adapter, which seeks to zero as part of
    /// loading new media.
    pub fn set_media(&mut self, media: Option<MediaRef>) {
        self.media = media;
        self.playing = true;
        self.length_ms = -1;
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn set_length(&mut self, length_ms: i64) {
        self.length_ms = length_ms;
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    pub fn mute(&mut self) {
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    pub fn time_ms(&self) -> i64 {
        self.time.time_ms()
    }

    /// See the module docs: flips exactly once per external position
    /// change, never on player-reported updates.
    pub fn external_update_toggle(&self) -> bool {
        self.time.updated_externally_toggle()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn length_ms(&self) -> i64 {
        self.length_ms
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn media(&self) -> Option<&MediaRef> {
        self.media.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MediaKind;

    fn playback() -> PlaybackState {
        PlaybackState::new(DEFAULT_SYNC_THRESHOLD_MS)
    }

    #[test]
    fn test_sync_below_threshold_does_not_seek() {
        // テスト項目: しきい値未満のドリフトではシークしない
        // given (前提条件):
        let mut playback = playback();
        playback.update_internally(5000);
        let toggle_before = playback.external_update_toggle();

        // when (操作):
        playback.sync(6999, false); // drift = 1999

        // then (期待する結果):
        assert_eq!(playback.time_ms(), 5000);
        assert_eq!(playback.external_update_toggle(), toggle_before);
    }

    #[test]
    fn test_sync_above_threshold_hard_seeks() {
        // テスト項目: しきい値を超えるドリフトでハードシークする
        // given (前提条件):
        let mut playback = playback();
        playback.update_internally(5000);
        let toggle_before = playback.external_update_toggle();

        // when (操作):
        playback.sync(7001, false); // drift = 2001

        // then (期待する結果):
        assert_eq!(playback.time_ms(), 7001);
        assert_ne!(playback.external_update_toggle(), toggle_before);
    }

    #[test]
    fn test_sync_exactly_at_threshold_does_not_seek() {
        // テスト項目: ドリフトがしきい値ちょうどの場合はシークしない
        // given (前提条件):
        let mut playback = playback();
        playback.update_internally(5000);

        // when (操作):
        playback.sync(7000, false); // drift = 2000

        // then (期待する結果):
        assert_eq!(playback.time_ms(), 5000);
    }

    #[test]
    fn test_sync_is_idempotent() {
        // テスト項目: 同じ引数での sync の繰り返しは一度しかシークを起こさない
        // given (前提条件):
        let mut playback = playback();
        let toggle_before = playback.external_update_toggle();

        // when (操作):
        playback.sync(10000, false);
        let toggle_after_first = playback.external_update_toggle();
        playback.sync(10000, false);
        playback.sync(10000, false);

        // then (期待する結果):
        assert_ne!(toggle_after_first, toggle_before, "first sync must seek");
        assert_eq!(
            playback.external_update_toggle(),
            toggle_after_first,
            "repeated syncs must not seek again"
        );
        assert_eq!(playback.time_ms(), 10000);
    }

    #[test]
    fn test_play_pause_correction_is_unconditional() {
        // テスト項目: ドリフトが 0 でも再生・一時停止はサーバーに合わせる
        // given (前提条件):
        let mut playback = playback();
        playback.update_internally(5000);
        assert!(playback.is_playing());

        // when (操作):
        playback.sync(5000, true); // drift = 0, but server is paused

        // then (期待する結果):
        assert!(!playback.is_playing());

        // 逆方向も同様
        playback.sync(5000, false);
        assert!(playback.is_playing());
    }

    #[test]
    fn test_update_internally_never_flips_toggle() {
        // テスト項目: プレイヤー自身の位置報告ではトグルが変化しない
        // given (前提条件):
        let mut playback = playback();
        let toggle_before = playback.external_update_toggle();

        // when (操作):
        for time in [100, 200, 300, 50_000] {
            playback.update_internally(time);
        }

        // then (期待する結果):
        assert_eq!(playback.external_update_toggle(), toggle_before);
        assert_eq!(playback.time_ms(), 50_000);
    }

    #[test]
    fn test_local_seek_flips_toggle_exactly_once() {
        // テスト項目: ユーザーのシークはトグルをちょうど一回反転させる
        // given (前提条件):
        let mut playback = playback();
        let toggle_before = playback.external_update_toggle();

        // when (操作):
        playback.seek_to(42_000);

        // then (期待する結果):
        assert_ne!(playback.external_update_toggle(), toggle_before);
        assert_eq!(playback.time_ms(), 42_000);
    }

    #[test]
    fn test_media_change_resets_playing_but_not_position() {
        // テスト項目: メディア切替で再生状態は再生中に戻り、位置は変わらない
        // given (前提条件):
        let mut playback = playback();
        playback.update_internally(30_000);
        playback.pause();

        // when (操作):
        playback.set_media(Some(MediaRef {
            kind: MediaKind::YouTube,
            id: "NEW".to_string(),
        }));

        // then (期待する結果):
        assert!(playback.is_playing());
        assert_eq!(playback.time_ms(), 30_000);
        assert_eq!(playback.media().unwrap().id, "NEW");
    }
}
