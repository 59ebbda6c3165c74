//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummaryDto {
    pub id: String,
    pub capacity: u32,
    pub has_password: bool,
    pub master_id: Option<String>,
    /// Users in the study room
    pub members: Vec<String>,
    /// Users in the waiting room
    pub waiting: Vec<String>,
    pub created_at: String,
}
