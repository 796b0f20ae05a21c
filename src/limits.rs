//! Per-key request rate limiting.
//!
//! Fixed-window counting: each API key gets a 60 second window and a
//! request budget; the window resets in place when its deadline passes.
//! State is process-local and lost on restart, which errs on the side
//! of admitting traffic.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::types::ApiKeyId;

pub const WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a rate limit check, carried into response headers.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets; the `retry-after` hint on denial.
    pub retry_after_secs: u64,
}

/// Seam for swapping in a shared (e.g. Redis-backed) limiter later.
pub trait RateLimiter: Send + Sync {
    fn check(&self, key: ApiKeyId) -> RateDecision;
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

pub struct FixedWindowLimiter {
    limit: u32,
    windows: DashMap<ApiKeyId, Window>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            windows: DashMap::new(),
        }
    }

    /// Drop windows that expired at least a full window ago. Called
    /// periodically by a background task; correctness never depends on
    /// it, only memory use does.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.windows.retain(|_, window| now < window.reset_at + WINDOW);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, key: ApiKeyId) -> RateDecision {
        let now = Instant::now();

        // The entry guard holds the shard lock, so reset-or-increment
        // is atomic per key.
        let mut window = self.windows.entry(key).or_insert_with(|| Window {
            count: 0,
            reset_at: now + WINDOW,
        });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + WINDOW;
        }

        window.count += 1;
        let allowed = window.count <= self.limit;
        let remaining = self.limit.saturating_sub(window.count);
        let retry_after_secs = window.reset_at.saturating_duration_since(now).as_secs().max(1);

        RateDecision {
            allowed,
            limit: self.limit,
            remaining,
            retry_after_secs,
        }
    }
}
