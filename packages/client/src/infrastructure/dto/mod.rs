//! Data Transfer Objects of the room namespace.
//!
//! The DTOs themselves live in `studyroom-shared` so that the development
//! server speaks exactly the same payloads; this module adds the conversions
//! into the client's domain.

pub mod conversion;

pub use studyroom_shared::protocol::dto::*;
