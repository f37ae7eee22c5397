//! Small shared utilities: cancellation, atomic file writes, clocks.

pub mod atomic_write;
pub mod sos;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Round-trip bookkeeping and inbox timestamps all use this single clock so
/// subtraction between recorded instants is meaningful.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
