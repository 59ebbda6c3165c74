//! Infrastructure layer: wire codec, WebSocket channel and media signaling.

pub mod codec;
pub mod dto;
pub mod signaling;
pub mod websocket;

pub use signaling::MediaSignalingAdapter;
pub use websocket::WebSocketChannel;
