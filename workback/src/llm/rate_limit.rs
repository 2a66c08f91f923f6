//! Per-process admission gate for outbound LLM requests.
//!
//! One gate per gateway instance. The lock is held across the sleep so that
//! concurrent callers are serialized and the minimum gap holds globally, not
//! per caller.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub struct RateLimiter {
    min_gap: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_request: Mutex::new(None),
        }
    }

    /// Block until the minimum inter-request gap has elapsed, then claim the
    /// current instant as the last request time.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_gap {
                tokio::time::sleep(self.min_gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
