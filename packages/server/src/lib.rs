//! Development signaling server for study rooms.
//!
//! Serves the room namespace over WebSocket with in-memory rooms and a fake
//! SFU that answers media negotiation with opaque parameters.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
