use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Addressable actuator slot on the device's controller board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServoChannel(pub u8);

impl std::fmt::Display for ServoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed per-servo configuration: hard mechanical limits, the narrower
/// advisory safe sub-range, and the neutral angle the servo parks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoConfig {
    pub channel: ServoChannel,
    pub name: String,
    pub min: i32,
    pub max: i32,
    pub safe_min: i32,
    pub safe_max: i32,
    pub home: i32,
}

impl ServoConfig {
    /// Checks `min <= safe_min <= safe_max <= max` and that `home` lies
    /// inside the hard limits.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        let ordered = self.min <= self.safe_min
            && self.safe_min <= self.safe_max
            && self.safe_max <= self.max;
        let home_in_range = self.min <= self.home && self.home <= self.max;
        if ordered && home_in_range {
            Ok(())
        } else {
            Err(EnvelopeError {
                channel: self.channel.0,
                min: self.min,
                safe_min: self.safe_min,
                safe_max: self.safe_max,
                max: self.max,
                home: self.home,
            })
        }
    }
}

/// One physical actuator as the console models it: fixed configuration plus
/// the current commanded angle (not a confirmed physical reading).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Servo {
    pub config: ServoConfig,
    pub angle: i32,
}

impl Servo {
    /// New servo parked at its home angle.
    pub fn from_config(config: ServoConfig) -> Self {
        let angle = config.home.clamp(config.min, config.max);
        Self { config, angle }
    }

    pub fn channel(&self) -> ServoChannel {
        self.config.channel
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSeverity {
    Info,
    Success,
    Error,
}

/// One operator-facing activity entry. Observational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub severity: LogSeverity,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            timestamp: Utc::now(),
        }
    }
}
