//! Message formatting utilities for terminal display.

use chanoma_shared::time::{duration_string, timestamp_to_jst_clock};

use crate::domain::{ChatMessage, MediaRef, User, UserRank};
use crate::session::{PlaylistSnapshot, PollSnapshot, StatusSnapshot};

/// Message formatter for terminal display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format one chat log entry.
    pub fn format_chat_message(message: &ChatMessage) -> String {
        match message {
            ChatMessage::User {
                timestamp,
                username,
                message,
            } => {
                let clock = timestamp_to_jst_clock(timestamp.timestamp_millis());
                format!("\n[{}] <{}> {}\n", clock, username, message)
            }
            ChatMessage::System { message } => format!("\n* {}\n", message),
            ChatMessage::Announcement { message } => format!("\n!! {}\n", message),
            ChatMessage::Connection { message, .. } => {
                format!("\n--- {} ---\n", message)
            }
        }
    }

    /// Format a media change notification.
    pub fn format_media_changed(media: &MediaRef) -> String {
        format!("\n> Now playing: {}\n", media.playable_url())
    }

    /// Format a user joining or leaving the channel.
    pub fn format_user_presence(name: &str, joined: bool) -> String {
        if joined {
            format!("\n+ {} joined\n", name)
        } else {
            format!("\n- {} left\n", name)
        }
    }

    /// Format the user roster for the `/users` command.
    pub fn format_user_list(users: &[User]) -> String {
        let mut output = String::new();
        output.push_str("\nUsers:\n");
        if users.is_empty() {
            output.push_str("(nobody here)\n");
        } else {
            for user in users {
                let afk = if user.afk { " [AFK]" } else { "" };
                output.push_str(&format!(
                    "{}{} ({}){}\n",
                    Self::rank_marker(user.rank),
                    user.name,
                    Self::rank_label(user.rank),
                    afk
                ));
            }
        }
        output
    }

    /// Format the playlist for the `/playlist` command.
    pub fn format_playlist(playlist: &PlaylistSnapshot) -> String {
        let mut output = String::new();
        let locked = if playlist.locked { " [locked]" } else { "" };
        output.push_str(&format!(
            "\nPlaylist: {} items, {}{}\n",
            playlist.count, playlist.time, locked
        ));
        for (position, item) in playlist.items.iter().enumerate() {
            output.push_str(&format!(
                "{:>3}. {} [{}] (queued by {})\n",
                position + 1,
                item.media.title,
                item.media.duration,
                item.queued_by
            ));
        }
        output
    }

    /// Format the current poll for the `/poll` command.
    pub fn format_poll(poll: &PollSnapshot) -> String {
        let mut output = String::new();
        let state = if poll.closed { " (closed)" } else { "" };
        output.push_str(&format!(
            "\nPoll by {}: {}{}\n",
            poll.initiator, poll.title, state
        ));
        for option in &poll.options {
            let share = if poll.total_count == 0 {
                0.0
            } else {
                f64::from(option.count) / f64::from(poll.total_count) * 100.0
            };
            let chosen = if poll.chosen_option == Some(option.index) {
                " <- your vote"
            } else {
                ""
            };
            output.push_str(&format!(
                "{:>3}. {} - {} votes ({:.0}%){}\n",
                option.index + 1,
                option.name,
                option.count,
                share,
                chosen
            ));
        }
        output.push_str(&format!("{} votes total\n", poll.total_count));
        output
    }

    /// Format the session status for the `/status` command.
    pub fn format_status(status: &StatusSnapshot) -> String {
        let mut output = String::new();
        output.push_str(&format!("\nPhase: {:?}\n", status.phase));
        match &status.channel {
            Some(channel) => output.push_str(&format!("Channel: {}\n", channel)),
            None => output.push_str("Channel: (not joined)\n"),
        }
        match &status.user {
            Some(user) => {
                let guest = if status.guest { " (guest)" } else { "" };
                output.push_str(&format!("Logged in as: {}{}\n", user, guest));
            }
            None => output.push_str("Not logged in\n"),
        }
        if let Some(media) = &status.media {
            let playing = if status.playing { "playing" } else { "paused" };
            output.push_str(&format!(
                "Media: {} ({} at {})\n",
                media.playable_url(),
                playing,
                duration_string(status.position_ms)
            ));
        }
        if let Some(reason) = &status.disconnect_reason {
            output.push_str(&format!("Last disconnect: {}\n", reason));
        }
        output
    }

    /// Format the outcome of a `/queue` submission.
    pub fn format_queue_result(url: &str, error: Option<&str>) -> String {
        match error {
            None => format!("\n+ queued {}\n", url),
            Some(error) => format!("\n! could not queue {}: {}\n", url, error),
        }
    }

    /// Command overview for `/help`.
    pub fn format_help() -> String {
        "\nCommands:\n\
         /queue <url> [next]  add media to the playlist (end by default)\n\
         /vote <n>            vote for option n of the current poll\n\
         /seek <seconds>      seek the local player\n\
         /users               list who is in the channel\n\
         /playlist            show the playlist\n\
         /poll                show the current poll\n\
         /status              show connection and playback status\n\
         /logout              forget the stored account\n\
         /quit                leave and exit\n\
         anything else is sent as a chat message\n"
            .to_string()
    }

    fn rank_marker(rank: UserRank) -> &'static str {
        match rank {
            UserRank::SiteAdmin => "~",
            UserRank::ChannelAdmin => "@",
            UserRank::Moderator => "%",
            UserRank::RegularUser | UserRank::Guest => "",
        }
    }

    fn rank_label(rank: UserRank) -> &'static str {
        match rank {
            UserRank::SiteAdmin => "site admin",
            UserRank::ChannelAdmin => "admin",
            UserRank::Moderator => "moderator",
            UserRank::RegularUser => "user",
            UserRank::Guest => "guest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MediaKind, PollOption};
    use crate::session::SessionPhase;
    use chanoma_shared::time::datetime_from_millis;

    #[test]
    fn test_format_user_chat_message() {
        // テスト項目: ユーザーメッセージが時刻付きでフォーマットされる
        // given (前提条件):
        let message = ChatMessage::User {
            timestamp: datetime_from_millis(1672531200000), // 09:00:00 JST
            username: "alice".to_string(),
            message: "Hello!".to_string(),
        };

        // when (操作):
        let result = MessageFormatter::format_chat_message(&message);

        // then (期待する結果):
        assert!(result.contains("[09:00:00]"));
        assert!(result.contains("<alice> Hello!"));
    }

    #[test]
    fn test_format_connection_message() {
        // テスト項目: 接続メッセージが区切り付きでフォーマットされる
        // given (前提条件):
        let message = ChatMessage::Connection {
            message: "Kicked: spam".to_string(),
            kind: crate::domain::ConnectionKind::Disconnected,
        };

        // when (操作):
        let result = MessageFormatter::format_chat_message(&message);

        // then (期待する結果):
        assert!(result.contains("--- Kicked: spam ---"));
    }

    #[test]
    fn test_format_media_changed_renders_playable_url() {
        // テスト項目: メディア変更通知に再生用 URL が含まれる
        // given (前提条件):
        let media = MediaRef {
            kind: MediaKind::YouTube,
            id: "ABC123".to_string(),
        };

        // when (操作):
        let result = MessageFormatter::format_media_changed(&media);

        // then (期待する結果):
        assert!(result.contains("Now playing: https://www.youtube.com/watch?v=ABC123"));
    }

    #[test]
    fn test_format_user_list_marks_ranks_and_afk() {
        // テスト項目: ユーザー一覧にランク記号と AFK が表示される
        // given (前提条件):
        let users = vec![
            User {
                name: "boss".to_string(),
                rank: UserRank::ChannelAdmin,
                afk: false,
                muted: false,
            },
            User {
                name: "sleepy".to_string(),
                rank: UserRank::Guest,
                afk: true,
                muted: false,
            },
        ];

        // when (操作):
        let result = MessageFormatter::format_user_list(&users);

        // then (期待する結果):
        assert!(result.contains("@boss (admin)"));
        assert!(result.contains("sleepy (guest) [AFK]"));
    }

    #[test]
    fn test_format_poll_shows_share_and_choice() {
        // テスト項目: 投票表示に得票率と自分の選択が出る
        // given (前提条件):
        let poll = PollSnapshot {
            title: "Next?".to_string(),
            initiator: "alice".to_string(),
            total_count: 4,
            options: vec![
                PollOption {
                    name: "this".to_string(),
                    count: 3,
                    index: 0,
                },
                PollOption {
                    name: "that".to_string(),
                    count: 1,
                    index: 1,
                },
            ],
            closed: false,
            chosen_option: Some(0),
        };

        // when (操作):
        let result = MessageFormatter::format_poll(&poll);

        // then (期待する結果):
        assert!(result.contains("Poll by alice: Next?"));
        assert!(result.contains("this - 3 votes (75%) <- your vote"));
        assert!(result.contains("that - 1 votes (25%)"));
    }

    #[test]
    fn test_format_status_without_media() {
        // テスト項目: メディア未ロード時のステータス表示
        // given (前提条件):
        let status = StatusSnapshot {
            phase: SessionPhase::Disconnected,
            channel: None,
            user: None,
            guest: false,
            kicked: false,
            disconnect_reason: Some("Can't connect to the server".to_string()),
            media: None,
            position_ms: 0,
            playing: false,
        };

        // when (操作):
        let result = MessageFormatter::format_status(&status);

        // then (期待する結果):
        assert!(result.contains("Channel: (not joined)"));
        assert!(result.contains("Last disconnect: Can't connect to the server"));
    }
}
