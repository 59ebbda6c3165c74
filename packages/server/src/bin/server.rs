//! Development signaling server for study rooms.
//!
//! Serves the room namespace with in-memory rooms and a fake SFU.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin studyroom-server
//! cargo run --bin studyroom-server -- --host 0.0.0.0 --port 3000 --room focus:2:secret
//! ```

use std::sync::Arc;

use clap::Parser;
use studyroom_server::{
    config::RoomSpec,
    infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryRoomRepository},
    ui::{AppState, Server},
};
use studyroom_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};

#[derive(Parser, Debug)]
#[command(name = "studyroom-server")]
#[command(about = "Development signaling server for study rooms", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Room to create at startup, as id[:capacity[:password]] (repeatable)
    #[arg(short = 'r', long = "room", default_value = "room-1")]
    rooms: Vec<RoomSpec>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // Initialize dependencies in order:
    // 1. Clock
    // 2. Repository
    // 3. MessagePusher
    // 4. AppState (UseCases)
    // 5. Server

    // 1. Create Clock
    let clock = Arc::new(SystemClock);
    let created_at = clock.now();

    // 2. Create Repository (in-memory database)
    for spec in &args.rooms {
        tracing::info!(
            "Room {} created! (capacity: {}, password: {})",
            spec.id,
            spec.capacity,
            if spec.password.is_some() { "yes" } else { "no" }
        );
    }
    let repository = Arc::new(InMemoryRoomRepository::with_rooms(
        args.rooms.into_iter().map(|spec| spec.into_room(created_at)),
    ));

    // 3. Create MessagePusher (WebSocket implementation)
    let message_pusher = Arc::new(WebSocketMessagePusher::new());

    // 4. Create UseCases
    let state = AppState::new(repository, message_pusher, clock);

    // 5. Create and run the server
    let server = Server::new(state);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
