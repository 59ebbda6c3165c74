//! Terminal client for a study room with reconnection support.
//!
//! Enters the waiting room of `--room`, then `/join` moves into the study
//! room where plain lines are sent as chat.
//! Automatically reconnects on disconnection (max 5 attempts with 5 second interval).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin studyroom-client -- --user-id alice --room room-1
//! cargo run --bin studyroom-client -- -i bob -r room-1 -p secret --muted-headset
//! ```

use clap::Parser;

use studyroom_client::client::{ClientOptions, run_client};
use studyroom_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "studyroom-client")]
#[command(about = "Terminal client for a co-studying room", long_about = None)]
struct Args {
    /// User ID announced to the server (must be unique)
    #[arg(short = 'i', long)]
    user_id: String,

    /// Display name, defaults to the user ID
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Room to enter
    #[arg(short = 'r', long)]
    room: String,

    /// Room password used by /join
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Enter the study room with the headset muted
    #[arg(long)]
    muted_headset: bool,

    /// Signaling server URL
    #[arg(short = 'u', long, default_value = "http://127.0.0.1:8080")]
    url: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let options = ClientOptions {
        url: args.url,
        user_id: args.user_id,
        name: args.name,
        room_id: args.room,
        password: args.password,
        muted_headset: args.muted_headset,
    };

    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
