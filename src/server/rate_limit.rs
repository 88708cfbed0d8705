use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window limiter for inbound requests, shared by the whole process.
///
/// Requests over the limit are rejected immediately, never queued.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    state: Mutex<Window>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    /// - `window`: length of one counting window
    /// - `max_requests`: requests accepted per window
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            state: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Try to admit one request.
    /// Returns `true` if allowed, `false` if rate limited.
    pub async fn check(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }

        if state.count < self.max_requests {
            state.count += 1;
            true
        } else {
            false
        }
    }
}
