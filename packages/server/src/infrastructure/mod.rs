//! Infrastructure 層
//!
//! - `dto`: ワイヤー形式 / HTTP レスポンスとドメインの変換
//! - `repository`: RoomRepository の実装
//! - `message_pusher`: MessagePusher の実装
//! - `sfu`: 擬似 SFU（トランスポート / コンシューマーのパラメータ生成）

pub mod dto;
pub mod message_pusher;
pub mod repository;
pub mod sfu;
