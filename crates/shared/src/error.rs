use thiserror::Error;

/// Failure taxonomy for device interactions. Every variant is handled at
/// the call site: the action is aborted and a log entry is appended; none
/// of them tears down the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Network unreachable, timeout, or a malformed response body.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The device answered but refused the command.
    #[error("device rejected command: {0}")]
    Rejected(String),
    /// A command was attempted while the console was not connected.
    #[error("not connected to the device")]
    NotConnected,
}

/// A servo configuration whose bounds violate
/// `min <= safe_min <= safe_max <= max`, or whose home angle falls outside
/// the hard limits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "servo {channel}: invalid envelope \
     (min={min}, safe_min={safe_min}, safe_max={safe_max}, max={max}, home={home})"
)]
pub struct EnvelopeError {
    pub channel: u8,
    pub min: i32,
    pub safe_min: i32,
    pub safe_max: i32,
    pub max: i32,
    pub home: i32,
}
