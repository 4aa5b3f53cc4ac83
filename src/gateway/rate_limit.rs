//! Per-node sliding-window rate limiting.
//!
//! Each node owns a queue of recent event timestamps. On every check the
//! queue is pruned to the window; a full queue limits the event and reports how
//! long until the oldest entry ages out.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SecurityConfig;

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: std::time::Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Sliding-window limiter shared by every dispatch lane.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>>,
    max_count: usize,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(max_count: usize, window: std::time::Duration, enabled: bool) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_count,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(60)),
            enabled,
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        Self::new(
            security.rate_limit_messages,
            security.rate_limit_window(),
            security.rate_limit_enabled,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check and, when allowed, record an event for `node_id` at `now`.
    pub fn check(&self, node_id: &str, now: DateTime<Utc>) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed;
        }
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let events = windows.entry(node_id.to_string()).or_default();
        let cutoff = now - self.window;
        while events.front().is_some_and(|t| *t <= cutoff) {
            events.pop_front();
        }

        if events.len() >= self.max_count {
            let retry_after = match events.front() {
                Some(oldest) => (self.window - (now - *oldest))
                    .to_std()
                    .unwrap_or_default(),
                None => std::time::Duration::ZERO,
            };
            return RateDecision::Limited { retry_after };
        }

        events.push_back(now);
        RateDecision::Allowed
    }

    /// Drop nodes with no events left inside the window. Returns how many were removed.
    pub fn cleanup_inactive(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let cutoff = now - self.window;
        let before = windows.len();
        windows.retain(|_, events| {
            while events.front().is_some_and(|t| *t <= cutoff) {
                events.pop_front();
            }
            !events.is_empty()
        });
        before - windows.len()
    }

    /// Number of nodes with tracked windows.
    pub fn tracked_nodes(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Forget one node's history.
    pub fn reset(&self, node_id: &str) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id);
    }
}
