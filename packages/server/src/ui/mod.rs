//! UI 層
//!
//! - `server`: Router の組み立てと起動
//! - `handler`: HTTP / WebSocket ハンドラとフレームの振り分け
//! - `state`: ハンドラが共有する UseCase 群

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::Server;
pub use state::AppState;
