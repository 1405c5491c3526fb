//! TokenBucket - プロセス全体の rate limiter
//!
//! 容量 `capacity` の bucket を `interval` ごとに満タンに戻す。
//! 補充は interval の境界に揃える（最後に補充した時刻 + n * interval）。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::ports::{Clock, RateLimiter};

struct BucketState {
    tokens: u32,
    window_start: DateTime<Utc>,
}

pub struct TokenBucket {
    capacity: u32,
    interval: chrono::Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let interval = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
        let window_start = clock.now();
        Self {
            capacity,
            interval,
            clock,
            state: Mutex::new(BucketState {
                tokens: capacity,
                window_start,
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens left in the current window (after any due refill).
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = self.clock.now() - state.window_start;
        if elapsed < self.interval || self.interval <= chrono::Duration::zero() {
            return;
        }
        let windows = elapsed.num_milliseconds() / self.interval.num_milliseconds().max(1);
        let advance = self.interval * i32::try_from(windows).unwrap_or(i32::MAX);
        state.window_start = state
            .window_start
            .checked_add_signed(advance)
            .unwrap_or_else(|| self.clock.now());
        state.tokens = self.capacity;
    }
}

impl RateLimiter for TokenBucket {
    fn try_acquire_n(&self, tokens: u32) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        if state.tokens < tokens {
            return false;
        }
        state.tokens -= tokens;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    fn bucket(capacity: u32, interval: Duration) -> (TokenBucket, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        (TokenBucket::new(capacity, interval, clock.clone()), clock)
    }

    #[test]
    fn denies_once_capacity_is_spent_within_an_interval() {
        let (limiter, clock) = bucket(5, Duration::from_secs(600));

        let granted = (0..6).filter(|_| limiter.try_acquire()).count();
        assert_eq!(granted, 5);

        clock.advance(Duration::from_secs(599));
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn full_interval_restores_capacity() {
        let (limiter, clock) = bucket(5, Duration::from_secs(600));
        while limiter.try_acquire() {}

        clock.advance(Duration::from_secs(600));

        assert_eq!(limiter.available(), 5);
        let granted = (0..10).filter(|_| limiter.try_acquire()).count();
        assert_eq!(granted, 5);
    }

    #[test]
    fn refill_does_not_accumulate_beyond_capacity() {
        let (limiter, clock) = bucket(3, Duration::from_secs(10));

        clock.advance(Duration::from_secs(95));

        assert_eq!(limiter.available(), 3);
    }

    #[test]
    fn refill_is_aligned_to_window_boundaries() {
        let (limiter, clock) = bucket(1, Duration::from_secs(10));
        assert!(limiter.try_acquire());

        // 境界から 5 秒過ぎた時点で補充、次の補充は +10s ではなく +5s 後
        clock.advance(Duration::from_secs(15));
        assert!(limiter.try_acquire());
        clock.advance(Duration::from_secs(5));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn concurrent_acquires_never_exceed_capacity() {
        let (limiter, _) = bucket(50, Duration::from_secs(60));
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.try_acquire()).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(granted, 50);
    }
}
