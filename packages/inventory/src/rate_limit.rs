//! Blocking sliding-window rate limiter.
//!
//! A caller that would exceed the ceiling sleeps until the oldest call in the
//! window expires. It never fails.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Admits at most `calls` calls within any `period`.
#[derive(Debug)]
pub struct RateLimiter {
    calls: usize,
    period: Duration,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. A ceiling of zero is treated as one call per period.
    pub fn new(calls: u32, period: Duration) -> Self {
        let calls = calls.max(1) as usize;
        Self {
            calls,
            period,
            window: Mutex::new(VecDeque::with_capacity(calls)),
        }
    }

    /// Limiter with a calls-per-second ceiling.
    pub fn per_second(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(1))
    }

    /// Block until a slot is free, then claim it.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|&oldest| now.duration_since(oldest) >= self.period)
                {
                    window.pop_front();
                }

                match window.front() {
                    Some(&oldest) if window.len() >= self.calls => {
                        self.period - now.duration_since(oldest)
                    }
                    _ => {
                        window.push_back(now);
                        return;
                    }
                }
            };

            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            thread::sleep(wait);
        }
    }
}
