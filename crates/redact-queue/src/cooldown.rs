//! Post-completion throttle.

use chrono::{DateTime, Duration, Utc};
use redact_models::UserId;
use std::collections::HashMap;
use tracing::info;

/// Per-user cooldown expiries.
///
/// Expired entries are never swept; they are dropped the next time
/// [`is_on_cooldown`](Self::is_on_cooldown) looks at them.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    duration: Duration,
    expiries: HashMap<UserId, DateTime<Utc>>,
}

impl CooldownGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            expiries: HashMap::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start (or restart) the cooldown for `user`.
    pub fn start(&mut self, user: UserId, now: DateTime<Utc>) {
        let expiry = now + self.duration;
        self.expiries.insert(user, expiry);
        info!(user_id = %user, secs = self.duration.num_seconds(), "Cooldown set");
    }

    /// Whether `user` is still cooling down. The cooldown is over at exactly
    /// the expiry instant.
    pub fn is_on_cooldown(&mut self, user: UserId, now: DateTime<Utc>) -> bool {
        match self.expiries.get(&user) {
            None => false,
            Some(expiry) if now >= *expiry => {
                self.expiries.remove(&user);
                false
            }
            Some(_) => true,
        }
    }

    /// Whole seconds left, rounded up; 0 when not on cooldown.
    pub fn remaining_secs(&mut self, user: UserId, now: DateTime<Utc>) -> u64 {
        if !self.is_on_cooldown(user, now) {
            return 0;
        }
        self.expiries
            .get(&user)
            .map(|expiry| {
                let millis = (*expiry - now).num_milliseconds().max(0) as u64;
                millis.div_ceil(1000)
            })
            .unwrap_or(0)
    }

    /// Drop the cooldown for `user`. Returns whether one existed.
    pub fn clear(&mut self, user: UserId) -> bool {
        let existed = self.expiries.remove(&user).is_some();
        if existed {
            info!(user_id = %user, "Cooldown cleared");
        }
        existed
    }

    /// Entries currently stored, including expired ones not yet observed.
    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}
