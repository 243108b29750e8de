//! Time utilities for the simulation loop

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Process start time for uptime tracking
static PROCESS_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize process start time (call once at startup)
pub fn init_process_time() {
    PROCESS_START.get_or_init(Instant::now);
}

/// Get process uptime in seconds
pub fn uptime_secs() -> u64 {
    PROCESS_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Default simulation frame rate
pub const DEFAULT_FRAME_RATE: u32 = 60;

/// Wall-clock duration of one frame at the given rate
pub fn frame_duration(frame_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / frame_rate.max(1) as u64)
}

/// Age of a timestamp relative to `now_ms`, saturating at zero for
/// timestamps from the future (peer clock skew).
pub fn age_ms(now_ms: u64, stamp_ms: u64) -> u64 {
    now_ms.saturating_sub(stamp_ms)
}

/// Convert a millisecond span into simulation seconds
pub fn ms_to_secs(ms: u64) -> f32 {
    ms as f32 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_saturates_for_future_stamps() {
        assert_eq!(age_ms(1_000, 400), 600);
        assert_eq!(age_ms(1_000, 5_000), 0);
    }

    #[test]
    fn frame_duration_guards_zero_rate() {
        assert_eq!(frame_duration(60), Duration::from_micros(16_666));
        assert_eq!(frame_duration(0), Duration::from_secs(1));
    }
}
