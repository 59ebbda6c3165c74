//! Startup configuration of the development server.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::domain::{Room, RoomId, ValueObjectError};

/// Capacity used when a room spec leaves it out
pub const DEFAULT_CAPACITY: u32 = 4;

#[derive(Debug, Error, PartialEq)]
pub enum RoomSpecError {
    #[error("invalid room id: {0}")]
    InvalidId(#[from] ValueObjectError),

    #[error("invalid capacity '{0}'")]
    InvalidCapacity(String),
}

/// A room created at startup, written as `id[:capacity[:password]]`
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSpec {
    pub id: RoomId,
    pub capacity: u32,
    pub password: Option<String>,
}

impl RoomSpec {
    pub fn into_room(self, created_at: DateTime<FixedOffset>) -> Room {
        Room::new(self.id, self.capacity, self.password, created_at)
    }
}

impl FromStr for RoomSpec {
    type Err = RoomSpecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // The password is the remainder, so it may contain ':'
        let mut parts = value.splitn(3, ':');
        let id = RoomId::new(parts.next().unwrap_or_default().trim())?;
        let capacity = match parts.next() {
            None => DEFAULT_CAPACITY,
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or_else(|| RoomSpecError::InvalidCapacity(raw.to_string()))?,
        };
        let password = parts
            .next()
            .filter(|password| !password.is_empty())
            .map(str::to_string);

        Ok(Self {
            id,
            capacity,
            password,
        })
    }
}
