//! Data Transfer Objects (DTOs) for the signaling server.
//!
//! - Room namespace payloads live in `studyroom_shared::protocol::dto`
//! - `http`: HTTP API response DTOs
//! - `conversion`: domain entities → wire DTOs

pub mod conversion;
pub mod http;
