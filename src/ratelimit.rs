//! Sliding-window limiter keyed by participant token.
//!
//! Identities are never evicted, so memory grows with the number of distinct
//! tokens seen over the process lifetime.

use std::{collections::HashMap, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    limits: Mutex<HashMap<String, Vec<Instant>>>,
    max_messages: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_messages: usize, window: Duration) -> Self {
        Self {
            limits: Mutex::new(HashMap::new()),
            max_messages,
            window,
        }
    }

    /// Records an action for `identity` if it fits in the current window.
    pub fn allow(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut limits = self.limits.lock();
        let recent = limits.entry(identity.to_owned()).or_default();
        recent.retain(|t| now.saturating_duration_since(*t) < self.window);

        if recent.len() >= self.max_messages {
            return false;
        }
        recent.push(now);
        true
    }
}
