//! Inbound frame rate limiting for messaging connections

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

/// Max inbound frames per second on one messaging connection
pub const FRAME_RATE_LIMIT: u32 = 60;

/// Per-connection limiter. A zero rate is treated as one frame per second.
pub struct FrameRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl FrameRateLimiter {
    pub fn new() -> Self {
        Self::with_rate(FRAME_RATE_LIMIT)
    }

    pub fn with_rate(per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    /// True if one more frame fits in the current quota
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for FrameRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_refused() {
        let limiter = FrameRateLimiter::with_rate(3);
        let allowed = (0..10).filter(|_| limiter.check()).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn zero_rate_still_admits_one() {
        let limiter = FrameRateLimiter::with_rate(0);
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
