//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Store write rate limit per process, across all local clients
pub const STORE_WRITE_RATE_LIMIT: u32 = 240; // Max 240 writes per second

/// Minimum spacing between two publishes of one avatar
pub const PUBLISH_INTERVAL_MS: u64 = 33;

/// Wall-clock cap on outbound store writes
#[derive(Clone)]
pub struct WriteLimiter {
    limiter: Arc<Limiter>,
}

impl WriteLimiter {
    pub fn new(writes_per_second: u32) -> Self {
        Self {
            limiter: create_limiter(writes_per_second),
        }
    }

    /// Check if a write is allowed (returns true if allowed)
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for WriteLimiter {
    fn default() -> Self {
        Self::new(STORE_WRITE_RATE_LIMIT)
    }
}

/// Publish cadence gate on the simulation clock.
///
/// Runs on frame timestamps rather than the wall clock so a session
/// replayed with synthetic time publishes exactly as it would live.
#[derive(Debug, Clone)]
pub struct PublishGate {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl PublishGate {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// Claim the slot at `now_ms` if the interval has elapsed
    pub fn try_claim(&mut self, now_ms: u64) -> bool {
        let open = match self.last_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
            None => true,
        };
        if open {
            self.last_ms = Some(now_ms);
        }
        open
    }
}

impl Default for PublishGate {
    fn default() -> Self {
        Self::new(PUBLISH_INTERVAL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_spaces_publishes() {
        let mut gate = PublishGate::new(33);
        assert!(gate.try_claim(0));
        assert!(!gate.try_claim(16));
        assert!(!gate.try_claim(32));
        assert!(gate.try_claim(33));
        assert!(!gate.try_claim(50));
        assert!(gate.try_claim(70));
    }

    #[test]
    fn write_limiter_caps_burst() {
        let limiter = WriteLimiter::new(2);
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
