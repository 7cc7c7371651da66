//! Per-user sliding-window request limiter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner()) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

/// Keeps the timestamps of admitted requests per user.
///
/// A check prunes entries older than the window, compares the remaining
/// count with the cap and records the request only when it is admitted.
/// The whole sequence runs under one lock, so racing requests from the same
/// user cannot both take the last slot. Users with nothing left in the
/// window are dropped from the map.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_allowed(&self, user_id: &str, max_requests: usize, window_minutes: u64) -> bool {
        self.check(user_id, max_requests, window_minutes).is_ok()
    }

    pub fn check(
        &self,
        user_id: &str,
        max_requests: usize,
        window_minutes: u64,
    ) -> Result<(), RateLimited> {
        let window = Duration::from_secs(window_minutes.saturating_mul(60));
        let now = self.clock.now();

        let window_start = now.checked_sub(window);

        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(window_start) = window_start {
            // Users whose newest request has left the window hold nothing.
            requests.retain(|_, history| history.back().is_some_and(|t| *t > window_start));
        }
        let history = requests.entry(user_id.to_string()).or_default();

        if let Some(window_start) = window_start {
            while history.front().is_some_and(|t| *t <= window_start) {
                history.pop_front();
            }
        }

        if history.len() >= max_requests {
            let counted = history.len();
            let retry_after = history
                .front()
                .map(|oldest| (*oldest + window).saturating_duration_since(now))
                .unwrap_or(window);
            if counted == 0 {
                requests.remove(user_id);
            }
            tracing::warn!(
                user_id,
                requests = counted,
                ?retry_after,
                "Rate limit exceeded"
            );
            return Err(RateLimited { retry_after });
        }

        history.push_back(now);
        Ok(())
    }

    /// Requests currently counted against `user_id`.
    pub fn in_window(&self, user_id: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .map_or(0, VecDeque::len)
    }

    /// Users with at least one request still held.
    pub fn tracked_users(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
