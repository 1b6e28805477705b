//! Sliding-window rate limiting primitives (§4.2).
//!
//! Two shapes are needed: the coupled short/long window used for the
//! match-history API, and a single-window variant for the simpler
//! tournament/static-data API. Both serialize `acquire` calls strictly in
//! call-arrival order by holding an async mutex across any wait — the lock
//! is cheap to hold because waiting suspends the task, not the thread.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default short-window limit (requests per second).
pub const DEFAULT_SHORT_LIMIT: u32 = 20;
/// Default long-window limit (requests per 120 seconds).
pub const DEFAULT_LONG_LIMIT: u32 = 100;

struct Windows {
    short: VecDeque<Instant>,
    long: VecDeque<Instant>,
}

/// Two coupled sliding windows (1s / 120s) guarding one region-endpoint
/// pair.
pub struct SlidingWindowLimiter {
    short_limit: u32,
    short_window: Duration,
    long_limit: u32,
    long_window: Duration,
    state: Mutex<Windows>,
}

fn evict(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while window.front().is_some_and(|oldest| now.duration_since(*oldest) >= span) {
        window.pop_front();
    }
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(short_limit: u32, long_limit: u32) -> Self {
        Self {
            short_limit,
            short_window: Duration::from_secs(1),
            long_limit,
            long_window: Duration::from_secs(120),
            state: Mutex::new(Windows {
                short: VecDeque::with_capacity(short_limit as usize + 1),
                long: VecDeque::with_capacity(long_limit as usize + 1),
            }),
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SHORT_LIMIT, DEFAULT_LONG_LIMIT)
    }

    /// Waits until both windows have capacity, then records the request.
    /// Serializes in strict FIFO order because the mutex is held across
    /// every wait in the loop.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        loop {
            let now = Instant::now();
            evict(&mut state.short, now, self.short_window);
            evict(&mut state.long, now, self.long_window);

            if state.short.len() as u32 >= self.short_limit {
                let oldest = *state.short.front().expect("checked len above");
                let wait = self.short_window.saturating_sub(now.duration_since(oldest));
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                    continue;
                }
            }

            if state.long.len() as u32 >= self.long_limit {
                let oldest = *state.long.front().expect("checked len above");
                let wait = self.long_window.saturating_sub(now.duration_since(oldest));
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                    continue;
                }
            }

            break;
        }

        let now = Instant::now();
        state.short.push_back(now);
        state.long.push_back(now);
    }

    /// Current occupancy, for tests and diagnostics.
    #[cfg(test)]
    async fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.short.len(), state.long.len())
    }
}

/// Single sliding window, used by the tournament/static-data API client.
pub struct SimpleLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<VecDeque<Instant>>,
}

impl SimpleLimiter {
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            limit: requests_per_second,
            window: Duration::from_secs(1),
            state: Mutex::new(VecDeque::with_capacity(requests_per_second as usize + 1)),
        }
    }

    pub async fn acquire(&self) {
        let mut window = self.state.lock().await;
        loop {
            let now = Instant::now();
            evict(&mut window, now, self.window);
            if (window.len() as u32) < self.limit {
                break;
            }
            let oldest = *window.front().expect("checked len above");
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            if wait.is_zero() {
                break;
            }
            tokio::time::sleep(wait).await;
        }
        window.push_back(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    #[tokio::test(start_paused = true)]
    async fn short_window_admits_exactly_the_limit_per_second() {
        let limiter = SlidingWindowLimiter::new(3, 1_000);
        for _ in 0..3 {
            limiter.acquire().await;
        }
        let (short, _) = limiter.counts().await;
        assert_eq!(short, 3);

        // A 4th request within the same second must wait ~1s.
        let start = Instant::now();
        limiter.acquire().await;
        assert!(Instant::now().duration_since(start) >= StdDuration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn long_window_admits_exactly_the_limit_per_120s() {
        let limiter = SlidingWindowLimiter::new(1_000, 2);
        limiter.acquire().await;
        limiter.acquire().await;
        let (_, long) = limiter.counts().await;
        assert_eq!(long, 2);

        let start = Instant::now();
        limiter.acquire().await;
        assert!(Instant::now().duration_since(start) >= StdDuration::from_secs(119));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_never_exceed_the_short_limit_in_one_window() {
        let limiter = Arc::new(SlidingWindowLimiter::new(5, 1_000));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let (short, _) = limiter.counts().await;
        assert_eq!(short, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn simple_limiter_respects_requests_per_second() {
        let limiter = SimpleLimiter::new(2);
        limiter.acquire().await;
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(Instant::now().duration_since(start) >= StdDuration::from_millis(900));
    }
}
