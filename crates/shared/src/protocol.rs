use serde::{Deserialize, Serialize};

use crate::domain::ServoChannel;

/// The only status value the device link accepts as healthy.
pub const STATUS_OK: &str = "ok";

/// `GET /status` response. The reference device reports extra hardware
/// flags; they are parsed leniently and surfaced for display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servo_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servo_initialized: Option<bool>,
}

impl StatusResponse {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// `POST /servo/move` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub channel: ServoChannel,
    pub angle: i32,
}

/// `POST /servo/move` response body. The device echoes the accepted
/// channel/angle on success and carries a reason on rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
