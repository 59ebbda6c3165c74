//! Shared building blocks for the study room client and the development server.
//!
//! - `logger`: tracing subscriber setup
//! - `protocol`: wire frame, event vocabulary and payload DTOs
//! - `time`: server time zone helpers

pub mod logger;
pub mod protocol;
pub mod time;
