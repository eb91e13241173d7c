//! # Rate Limiter
//!
//! Sliding-window admission gate in front of one external service.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  acquire()                                                              │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  lock ─► drop timestamps older than W ─► count < Q ? ──yes──► record   │
//! │     ▲                                        │              now, return│
//! │     │                                        no                         │
//! │     │                                        ▼                          │
//! │     │                 delay = W - (now - oldest) + buffer               │
//! │     │                                        │                          │
//! │     └──────── unlock, sleep(delay), retry ◄──┘                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The check-and-record step runs under one mutex; sleeping happens
//! outside of it so other callers can drain the window meanwhile. There is
//! no timeout: a blocked caller waits at most W + buffer per retry.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

// =============================================================================
// Policy
// =============================================================================

/// Quota of `max_requests` per trailing `window`, plus a safety `buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: usize,
    pub buffer: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        RateLimitPolicy {
            window: Duration::from_secs(60),
            max_requests: 60,
            buffer: Duration::from_secs(2),
        }
    }
}

// =============================================================================
// Sliding Window
// =============================================================================

/// The admission bookkeeping, independent of any clock.
#[derive(Debug)]
pub struct SlidingWindow {
    policy: RateLimitPolicy,
    admitted: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(policy: RateLimitPolicy) -> Self {
        SlidingWindow {
            policy,
            admitted: VecDeque::with_capacity(policy.max_requests),
        }
    }

    /// Admits one call at `now`, or returns how long to wait before retrying.
    pub fn try_admit(&mut self, now: Instant) -> Result<(), Duration> {
        self.evict(now);

        if self.admitted.len() < self.policy.max_requests {
            self.admitted.push_back(now);
            return Ok(());
        }

        let oldest = self.admitted.front().copied().unwrap_or(now);
        let age = now.saturating_duration_since(oldest);
        Err(self.policy.window.saturating_sub(age) + self.policy.buffer)
    }

    /// Calls admitted within the trailing window ending at `now`.
    pub fn in_window(&self, now: Instant) -> usize {
        self.admitted
            .iter()
            .filter(|at| now.saturating_duration_since(**at) < self.policy.window)
            .count()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.admitted.front() {
            if now.saturating_duration_since(*oldest) >= self.policy.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

// =============================================================================
// Rate Limiter
// =============================================================================

/// Thread-safe limiter shared by every call to one service.
#[derive(Debug)]
pub struct RateLimiter {
    service: &'static str,
    policy: RateLimitPolicy,
    window: Mutex<SlidingWindow>,
}

impl RateLimiter {
    pub fn new(service: &'static str, policy: RateLimitPolicy) -> Self {
        RateLimiter {
            service,
            policy,
            window: Mutex::new(SlidingWindow::new(policy)),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Waits until one more request may be sent, then records it.
    pub async fn acquire(&self) {
        loop {
            let delay = {
                let mut window = self.lock_window();
                match window.try_admit(Instant::now()) {
                    Ok(()) => {
                        trace!(service = self.service, "Request admitted");
                        return;
                    }
                    Err(delay) => delay,
                }
            };

            debug!(
                service = self.service,
                max_requests = self.policy.max_requests,
                window_secs = self.policy.window.as_secs(),
                delay_ms = delay.as_millis() as u64,
                "Enforcing rate limit"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// A poisoned window is still a valid window.
    fn lock_window(&self) -> MutexGuard<'_, SlidingWindow> {
        self.window.lock().unwrap_or_else(|poisoned| {
            warn!(service = self.service, "Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
