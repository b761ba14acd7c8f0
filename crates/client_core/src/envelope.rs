//! Safety envelope: pure clamping against the hard limits and the advisory
//! safe-range predicate.

use shared::domain::{Servo, ServoConfig};

/// Clamps a requested angle into the servo's hard mechanical limits.
/// Total over all integers. The safety sub-range never restricts a move.
pub fn clamp_angle(config: &ServoConfig, requested: i32) -> i32 {
    requested.clamp(config.min, config.max)
}

/// True when the commanded angle sits inside the advisory safe sub-range,
/// boundaries included. Drives status display only; never refuses a move.
pub fn is_safe(servo: &Servo) -> bool {
    (servo.config.safe_min..=servo.config.safe_max).contains(&servo.angle)
}
