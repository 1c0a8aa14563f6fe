//! Client execution: wires the protocol client, the session actor, and the
//! terminal input loop together.

use std::sync::Arc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::protocol::event::{ChannelEvent, ChannelEventListener};
use crate::protocol::{ChannelApi, CytubeClient};
use crate::session::spawn_session;
use crate::settings::{ClientSettings, CredentialStore, MemoryCredentialStore};

use super::formatter::MessageFormatter;
use super::ui::redisplay_prompt;

/// Everything the binary collects from the command line.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub channel: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_url: String,
    pub sync_threshold_ms: i64,
}

/// Run the interactive client until the user quits.
pub async fn run_client(options: ClientOptions) -> Result<(), Box<dyn std::error::Error>> {
    let http = reqwest::Client::new();
    let client = CytubeClient::new(http, options.base_url.clone());

    // Print incoming events directly; the session actor keeps the state
    // the query commands read from.
    client.add_event_listener(Arc::new(DisplayListener {
        prompt: options.channel.clone(),
    }));

    let credentials = Arc::new(MemoryCredentialStore::new());
    if let (Some(username), Some(password)) = (&options.username, &options.password) {
        credentials.store_password(username, password);
    }

    let settings = ClientSettings {
        channel: None, // targeted below through the handle
        username: options.username.clone(),
        sync_threshold_ms: options.sync_threshold_ms,
        ..ClientSettings::default()
    };

    let (handle, session_task) = spawn_session(&client, settings, credentials);
    handle.set_channel(Some(options.channel.clone()));

    println!(
        "\nJoining '{}'. Type a message to chat, /help for commands, /quit to exit.\n",
        options.channel
    );

    // rustyline is synchronous; it gets its own thread feeding a channel.
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let prompt_channel = options.channel.clone();
    let _readline_handle = std::thread::spawn(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", prompt_channel);

        loop {
            match editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        editor.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    tracing::error!("readline error: {}", err);
                    break;
                }
            }
        }
    });

    while let Some(line) = input_rx.recv().await {
        match parse_command(&line) {
            Command::Chat(message) => client.send_message(&message),
            Command::Queue {
                url,
                put_last,
                temp,
            } => {
                // Awaited concurrently so the input loop stays responsive
                // while the reply is outstanding.
                let client = client.clone();
                let prompt = options.channel.clone();
                tokio::spawn(async move {
                    let result = client.queue(&url, put_last, temp).await;
                    let error = result.as_ref().err().map(ToString::to_string);
                    print!(
                        "{}",
                        MessageFormatter::format_queue_result(&url, error.as_deref())
                    );
                    redisplay_prompt(&prompt);
                });
            }
            Command::Vote(option_index) => handle.vote(option_index),
            Command::Seek(time_ms) => handle.local_seek(time_ms),
            Command::Users => {
                if let Some(users) = handle.users().await {
                    print!("{}", MessageFormatter::format_user_list(&users));
                    redisplay_prompt(&options.channel);
                }
            }
            Command::Playlist => {
                if let Some(playlist) = handle.playlist().await {
                    print!("{}", MessageFormatter::format_playlist(&playlist));
                    redisplay_prompt(&options.channel);
                }
            }
            Command::Poll => {
                if let Some(poll) = handle.poll().await {
                    match poll {
                        Some(poll) => print!("{}", MessageFormatter::format_poll(&poll)),
                        None => print!("\n(no poll right now)\n"),
                    }
                    redisplay_prompt(&options.channel);
                }
            }
            Command::Status => {
                if let Some(status) = handle.status().await {
                    print!("{}", MessageFormatter::format_status(&status));
                    redisplay_prompt(&options.channel);
                }
            }
            Command::Logout => handle.logout(),
            Command::Help => {
                print!("{}", MessageFormatter::format_help());
                redisplay_prompt(&options.channel);
            }
            Command::Quit => break,
            Command::Invalid(reason) => {
                print!("\n! {}\n", reason);
                redisplay_prompt(&options.channel);
            }
        }
    }

    tracing::info!("leaving '{}'", options.channel);
    handle.set_channel(None);
    handle.shutdown();
    let _ = session_task.await;

    Ok(())
}

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Chat(String),
    Queue {
        url: String,
        put_last: bool,
        temp: bool,
    },
    Vote(usize),
    Seek(i64),
    Users,
    Playlist,
    Poll,
    Status,
    Logout,
    Help,
    Quit,
    Invalid(String),
}

/// Parse one input line: `/`-prefixed lines are commands, everything else
/// is chat.
pub(crate) fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if !line.starts_with('/') {
        return Command::Chat(line.to_string());
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    match head {
        "/queue" | "/q" => {
            let mut words = rest.split_whitespace();
            match words.next() {
                Some(url) => Command::Queue {
                    url: url.to_string(),
                    put_last: words.next() != Some("next"),
                    temp: true,
                },
                None => Command::Invalid("usage: /queue <url> [next]".to_string()),
            }
        }
        "/vote" | "/v" => match rest.parse::<usize>() {
            Ok(number) if number >= 1 => Command::Vote(number - 1),
            _ => Command::Invalid("usage: /vote <option number>".to_string()),
        },
        "/seek" => match rest.parse::<i64>() {
            Ok(seconds) => Command::Seek(seconds * 1000),
            Err(_) => Command::Invalid("usage: /seek <seconds>".to_string()),
        },
        "/users" => Command::Users,
        "/playlist" | "/pl" => Command::Playlist,
        "/poll" => Command::Poll,
        "/status" => Command::Status,
        "/logout" => Command::Logout,
        "/help" | "/h" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command: {}", other)),
    }
}

/// Prints channel activity to the terminal as it happens.
struct DisplayListener {
    prompt: String,
}

impl ChannelEventListener for DisplayListener {
    fn on_event(&self, event: &ChannelEvent) {
        let output = match event {
            ChannelEvent::Chat {
                timestamp,
                username,
                message,
            } => MessageFormatter::format_chat_message(&crate::domain::ChatMessage::User {
                timestamp: *timestamp,
                username: username.clone(),
                message: message.clone(),
            }),
            ChannelEvent::Connected => "\n--- Connected ---\n".to_string(),
            ChannelEvent::Disconnected => "\n--- Disconnected ---\n".to_string(),
            ChannelEvent::Kicked { reason } => format!("\n--- Kicked: {} ---\n", reason),
            ChannelEvent::LoginSucceeded { name, guest } => {
                let guest = if *guest { " (guest)" } else { "" };
                format!("\n--- Logged in as {}{} ---\n", name, guest)
            }
            ChannelEvent::MediaChanged(media) => MessageFormatter::format_media_changed(media),
            ChannelEvent::UserJoined(user) => {
                MessageFormatter::format_user_presence(&user.name, true)
            }
            ChannelEvent::UserLeft { name } => MessageFormatter::format_user_presence(name, false),
            ChannelEvent::PollOpened(poll) => {
                format!("\n!! {} opened a poll: {}\n", poll.initiator, poll.title)
            }
            _ => return,
        };
        print!("{}", output);
        redisplay_prompt(&self.prompt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_chat() {
        // テスト項目: スラッシュで始まらない行はチャットとして送られる
        // given (前提条件):
        let line = "hello everyone";

        // when (操作):
        let command = parse_command(line);

        // then (期待する結果):
        assert_eq!(command, Command::Chat("hello everyone".to_string()));
    }

    #[test]
    fn test_queue_defaults_to_end_and_temp() {
        // テスト項目: /queue は既定で末尾・一時追加になる
        // given (前提条件):
        let line = "/queue https://www.youtube.com/watch?v=ABC123";

        // when (操作):
        let command = parse_command(line);

        // then (期待する結果):
        assert_eq!(
            command,
            Command::Queue {
                url: "https://www.youtube.com/watch?v=ABC123".to_string(),
                put_last: true,
                temp: true,
            }
        );
    }

    #[test]
    fn test_queue_next_puts_after_current() {
        // テスト項目: /queue <url> next で次の位置に追加される
        // given (前提条件):
        let line = "/queue https://example.com/a.mp4 next";

        // when (操作):
        let command = parse_command(line);

        // then (期待する結果):
        assert_eq!(
            command,
            Command::Queue {
                url: "https://example.com/a.mp4".to_string(),
                put_last: false,
                temp: true,
            }
        );
    }

    #[test]
    fn test_vote_is_one_based_for_humans() {
        // テスト項目: /vote の番号は 1 始まりで、送信は 0 始まりになる
        // given (前提条件):
        let line = "/vote 2";

        // when (操作):
        let command = parse_command(line);

        // then (期待する結果):
        assert_eq!(command, Command::Vote(1));
    }

    #[test]
    fn test_vote_zero_is_invalid() {
        // テスト項目: /vote 0 は不正な入力として扱われる
        // given (前提条件):
        let line = "/vote 0";

        // when (操作):
        let command = parse_command(line);

        // then (期待する結果):
        assert!(matches!(command, Command::Invalid(_)));
    }

    #[test]
    fn test_seek_converts_seconds_to_millis() {
        // テスト項目: /seek の秒数がミリ秒に変換される
        // given (前提条件):
        let line = "/seek 90";

        // when (操作):
        let command = parse_command(line);

        // then (期待する結果):
        assert_eq!(command, Command::Seek(90_000));
    }

    #[test]
    fn test_unknown_command_is_invalid() {
        // テスト項目: 未知のコマンドは Invalid になる
        // given (前提条件):
        let line = "/dance";

        // when (操作):
        let command = parse_command(line);

        // then (期待する結果):
        assert!(matches!(command, Command::Invalid(reason) if reason.contains("/dance")));
    }
}
