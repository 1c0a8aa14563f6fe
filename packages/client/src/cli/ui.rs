//! Terminal prompt helpers for the CLI client.

use std::io::Write;

/// Redisplay the input prompt after printing a message.
pub(crate) fn redisplay_prompt(channel: &str) {
    print!("{}> ", channel);
    std::io::stdout().flush().ok();
}
