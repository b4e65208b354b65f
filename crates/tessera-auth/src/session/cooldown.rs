//! Backend lookup cooldown.
//!
//! When the auth backend fails a lookup, further lookups for the same
//! session id are short-circuited for a window instead of hammering a
//! backend that is already struggling.

use crate::session::SessionId;
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub struct LookupCooldown {
    window: Duration,
    failures: DashMap<SessionId, Instant>,
}

impl LookupCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            failures: DashMap::new(),
        }
    }

    /// Note a failed backend lookup for this session id.
    pub fn record_failure(&self, id: &SessionId) {
        self.failures.insert(id.clone(), Instant::now());
    }

    /// Whether lookups for this session id are currently short-circuited.
    pub fn is_cooling(&self, id: &SessionId) -> bool {
        let mut expired = false;
        let cooling = match self.failures.get(id) {
            Some(failed_at) => {
                if failed_at.elapsed() < self.window {
                    true
                } else {
                    expired = true;
                    false
                }
            }
            None => false,
        };
        if expired {
            self.failures.remove(id);
        }
        cooling
    }

    /// Forget a failure, typically after a successful lookup.
    pub fn clear(&self, id: &SessionId) {
        self.failures.remove(id);
    }

    /// Drop entries whose window has elapsed. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let before = self.failures.len();
        self.failures
            .retain(|_, failed_at| failed_at.elapsed() < self.window);
        before.saturating_sub(self.failures.len())
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}
