//! Interactive terminal client for a study room.

mod domain;
mod error;
mod formatter;
mod input;
mod runner;
mod session;
mod ui;

pub use error::ClientError;
pub use runner::{ClientOptions, run_client};
