//! Polling interval resolution.
//!
//! A video polls at its own override when one is set and otherwise
//! follows the global default. Both values are restricted to
//! [`ALLOWED_INTERVALS`].

use crate::error::AppError;

/// Polling periods, in seconds, accepted from the control surface.
pub const ALLOWED_INTERVALS: &[u64] = &[10, 15, 30, 60, 120, 300];

/// Global default used until the config record says otherwise.
pub const DEFAULT_INTERVAL_SECONDS: u64 = 30;

pub fn is_allowed_interval(secs: u64) -> bool {
    ALLOWED_INTERVALS.contains(&secs)
}

/// Reject any period outside [`ALLOWED_INTERVALS`].
pub fn validate_interval(secs: u64) -> Result<u64, AppError> {
    if is_allowed_interval(secs) {
        Ok(secs)
    } else {
        let allowed: Vec<String> = ALLOWED_INTERVALS.iter().map(|s| s.to_string()).collect();
        Err(AppError::validation(format!(
            "Invalid interval '{}'. Must be one of: {}",
            secs,
            allowed.join(", ")
        )))
    }
}

/// Effective interval of a video: its override if present, else the default.
pub fn resolve(override_secs: Option<u64>, default_secs: u64) -> u64 {
    override_secs.unwrap_or(default_secs)
}
