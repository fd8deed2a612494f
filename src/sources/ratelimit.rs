//! Per-source request quota

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Sliding-window request limiter.
///
/// Each checker owns one; quotas are not shared between sources.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_hour(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(3600))
    }

    /// Take one request slot if the window has room
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut sent = self.sent.lock();

        while let Some(&oldest) = sent.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                sent.pop_front();
            } else {
                break;
            }
        }

        if sent.len() >= self.max_requests as usize {
            return false;
        }

        sent.push_back(now);
        true
    }

    /// Slots left in the current window
    pub fn remaining(&self) -> u32 {
        let sent = self.sent.lock().len() as u32;
        self.max_requests.saturating_sub(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exhaustion_and_recovery() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.try_acquire_at(start));
        assert!(limiter.try_acquire_at(start + Duration::from_secs(1)));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(2)));
        assert_eq!(limiter.remaining(), 0);

        // First slot frees up once it leaves the window
        assert!(limiter.try_acquire_at(start + Duration::from_secs(60)));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_follows_runtime_clock() {
        let limiter = RateLimiter::per_hour(1);

        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire());
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn test_zero_quota_always_denies() {
        let limiter = RateLimiter::per_hour(0);
        assert!(!limiter.try_acquire());
    }
}
