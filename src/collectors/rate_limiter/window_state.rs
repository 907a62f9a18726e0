//! Sliding-window call state.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Length of the short window.
pub fn minute_window() -> chrono::Duration {
    chrono::Duration::seconds(60)
}

/// Length of the long window.
pub fn day_window() -> chrono::Duration {
    chrono::Duration::hours(24)
}

/// Timestamps of recent calls, oldest first.
#[derive(Debug, Clone, Default)]
pub struct WindowState {
    /// Calls inside the rolling 60s window.
    pub minute_calls: VecDeque<DateTime<Utc>>,
    /// Calls inside the rolling 24h window.
    pub day_calls: VecDeque<DateTime<Utc>>,
    /// Most recent call.
    pub last_call: Option<DateTime<Utc>>,
    /// Calls recorded since process start.
    pub total_calls: u64,
    /// Checks that returned "no capacity".
    pub denied_checks: u64,
}

impl WindowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries that have left their window.
    ///
    /// Both queues are chronologically sorted since calls are always
    /// appended, so expired entries are all at the front.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let minute_cutoff = now - minute_window();
        while self.minute_calls.front().is_some_and(|t| *t <= minute_cutoff) {
            self.minute_calls.pop_front();
        }
        let day_cutoff = now - day_window();
        while self.day_calls.front().is_some_and(|t| *t <= day_cutoff) {
            self.day_calls.pop_front();
        }
    }

    /// Whether both windows have room for another call at `now`.
    pub fn has_capacity(
        &mut self,
        now: DateTime<Utc>,
        max_per_minute: u32,
        max_per_day: u32,
    ) -> bool {
        self.prune(now);
        let ok = self.minute_calls.len() < max_per_minute as usize
            && self.day_calls.len() < max_per_day as usize;
        if !ok {
            self.denied_checks += 1;
        }
        ok
    }

    /// Append a call to both windows.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.minute_calls.push_back(now);
        self.day_calls.push_back(now);
        self.last_call = Some(now);
        self.total_calls += 1;
    }

    /// Remaining spacing before the next call may start.
    pub fn spacing_wait(&self, now: DateTime<Utc>, min_spacing: Duration) -> Duration {
        let Some(last) = self.last_call else {
            return Duration::ZERO;
        };
        // A clock step backwards yields a negative elapsed; treat as zero.
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        min_spacing.saturating_sub(elapsed)
    }

    /// Time until the oldest call leaves whichever window is full.
    pub fn time_until_slot(
        &mut self,
        now: DateTime<Utc>,
        max_per_minute: u32,
        max_per_day: u32,
    ) -> Duration {
        self.prune(now);
        let mut wait = Duration::ZERO;
        if self.minute_calls.len() >= max_per_minute as usize {
            if let Some(oldest) = self.minute_calls.front() {
                wait = wait.max(until(*oldest + minute_window(), now));
            }
        }
        if self.day_calls.len() >= max_per_day as usize {
            if let Some(oldest) = self.day_calls.front() {
                wait = wait.max(until(*oldest + day_window(), now));
            }
        }
        wait
    }
}

fn until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}
