//! Terminal client for CyTube-style synchronized watching channels.
//!
//! Joins a channel, mirrors its chat and playback state, and sends chat
//! and playlist commands. Reconnects automatically on transient network
//! drops (max 5 attempts with 5 second interval).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin chanoma -- --channel lounge
//! cargo run --bin chanoma -- -c lounge -u alice -p secret
//! ```

use clap::Parser;

use chanoma_client::cli::{ClientOptions, run_client};
use chanoma_client::resolver::DEFAULT_BASE_URL;
use chanoma_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "chanoma")]
#[command(about = "Terminal client for CyTube-style watch-together channels", long_about = None)]
struct Args {
    /// Channel to join
    #[arg(short = 'c', long)]
    channel: String,

    /// Account to log in as (requires --password)
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Password for the account
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Base URL of the service
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Playback drift in milliseconds tolerated before a hard seek
    #[arg(long, default_value_t = 2000)]
    sync_threshold: i64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let options = ClientOptions {
        channel: args.channel,
        username: args.username,
        password: args.password,
        base_url: args.base_url,
        sync_threshold_ms: args.sync_threshold,
    };

    // Run the client
    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
