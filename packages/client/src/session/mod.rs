//! Session layer.
//!
//! [`RoomSessionHandle`] はセッションアクターへの窓口です。状態は 1 つのタスクが
//! 所有し、UI からのコマンド・サーバーからのイベント・非同期 I/O の完了を
//! 順番に処理します。

pub mod command;
pub mod config;
pub mod handle;
mod machine;


pub use command::Moderation;
pub use config::SessionConfig;
pub use handle::RoomSessionHandle;
