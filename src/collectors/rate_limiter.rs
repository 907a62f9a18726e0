//! Rate limiter protecting the search API.
//!
//! Two rolling windows (60 seconds and 24 hours) cap the number of calls, and
//! a minimum spacing timer keeps consecutive calls apart. Expired entries are
//! pruned lazily whenever the limiter is consulted. State lives only in
//! memory and resets when the process restarts.

mod window_state;

pub use window_state::{day_window, minute_window, WindowState};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration for rate limiting behavior.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum calls in any rolling 60 seconds.
    pub max_per_minute: u32,
    /// Maximum calls in any rolling 24 hours.
    pub max_per_day: u32,
    /// Minimum time between the start of two calls.
    pub min_spacing: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 10,
            max_per_day: 1000,
            min_spacing: Duration::from_secs(6),
        }
    }
}

/// Capability to gate calls to an external service.
///
/// `can_proceed` is advisory: a `false` means the caller should skip work
/// this cycle. `acquire` is the blocking path used right before a call.
#[async_trait]
pub trait CallBudget: Send + Sync {
    /// Whether both windows currently have room.
    async fn can_proceed(&self) -> bool;

    /// Wait out the spacing timer and record the call.
    ///
    /// Returns false, without recording, if the windows filled up while
    /// waiting (another worker took the last slot).
    async fn acquire(&self) -> bool;
}

/// Sliding-window rate limiter shared by every collector.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<WindowState>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(WindowState::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether another call fits in both windows.
    pub async fn can_call(&self) -> bool {
        let mut state = self.state.lock().await;
        let ok = state.has_capacity(
            Utc::now(),
            self.config.max_per_minute,
            self.config.max_per_day,
        );
        if !ok {
            let wait = state.time_until_slot(
                Utc::now(),
                self.config.max_per_minute,
                self.config.max_per_day,
            );
            debug!("Rate limit reached, next slot in {:?}", wait);
        }
        ok
    }

    /// Record a call in both windows.
    pub async fn record_call(&self) {
        let mut state = self.state.lock().await;
        state.record(Utc::now());
    }

    /// Time left before the spacing timer allows another call.
    pub async fn wait_time(&self) -> Duration {
        let state = self.state.lock().await;
        state.spacing_wait(Utc::now(), self.config.min_spacing)
    }

    /// Sleep until the minimum spacing since the last call has elapsed.
    pub async fn wait_if_needed(&self) {
        let wait = self.wait_time().await;
        if wait > Duration::ZERO {
            info!("Rate limiting: waiting {:.1} seconds", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }

    /// Wait for the spacing timer, then claim a call slot.
    ///
    /// The capacity check and the record happen under one lock so concurrent
    /// collectors cannot both take the last slot. If another caller claimed
    /// a slot during the wait, the spacing timer is waited out again.
    pub async fn acquire(&self) -> bool {
        loop {
            self.wait_if_needed().await;

            let mut state = self.state.lock().await;
            let now = Utc::now();
            if !state.has_capacity(now, self.config.max_per_minute, self.config.max_per_day) {
                warn!("Rate limit reached while waiting for a call slot");
                return false;
            }
            if state.spacing_wait(now, self.config.min_spacing).is_zero() {
                state.record(now);
                return true;
            }
            debug!("Call slot taken during the wait, waiting again");
        }
    }

    /// Get a snapshot of current usage.
    pub async fn stats(&self) -> RateLimitStats {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.prune(now);
        RateLimitStats {
            calls_last_minute: state.minute_calls.len(),
            calls_last_day: state.day_calls.len(),
            total_calls: state.total_calls,
            denied_checks: state.denied_checks,
            next_slot_in: state
                .time_until_slot(now, self.config.max_per_minute, self.config.max_per_day)
                .max(state.spacing_wait(now, self.config.min_spacing)),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallBudget for RateLimiter {
    async fn can_proceed(&self) -> bool {
        self.can_call().await
    }

    async fn acquire(&self) -> bool {
        RateLimiter::acquire(self).await
    }
}

/// Usage snapshot of the limiter.
#[derive(Debug, Clone)]
pub struct RateLimitStats {
    pub calls_last_minute: usize,
    pub calls_last_day: usize,
    pub total_calls: u64,
    pub denied_checks: u64,
    pub next_slot_in: Duration,
}
