//! Replay-prevention cache for state-response tokens (§4.4, §5).
//!
//! A bounded, TTL-expiring map keyed by `state`; grounded on
//! `_teacher_ref/circuit/breaker.rs`'s pattern of a `DashMap` guarding
//! per-key state transitions with `Instant`-based expiry checked on access
//! rather than a background sweep.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Tracks which `state` values have already been accepted, so a second
/// state-response token carrying the same value within its TTL is rejected.
#[derive(Default)]
pub struct ReplayCache {
    seen: DashMap<String, Instant>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `state` had not been seen within `ttl` and is now
    /// recorded (first acceptance); `false` if this is a replay.
    pub fn check_and_insert(&self, state: &str, ttl: Duration) -> bool {
        self.evict_expired(ttl);

        if let Some(seen_at) = self.seen.get(state) {
            if seen_at.elapsed() < ttl {
                return false;
            }
        }
        self.seen.insert(state.to_string(), Instant::now());
        true
    }

    fn evict_expired(&self, ttl: Duration) {
        self.seen.retain(|_, seen_at| seen_at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_state_within_ttl_is_rejected() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("abc", Duration::from_secs(10)));
        assert!(!cache.check_and_insert("abc", Duration::from_secs(10)));
    }

    #[test]
    fn state_accepted_again_after_ttl_elapses() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("abc", Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.check_and_insert("abc", Duration::from_millis(10)));
    }

    #[test]
    fn distinct_states_do_not_interfere() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("a", Duration::from_secs(10)));
        assert!(cache.check_and_insert("b", Duration::from_secs(10)));
    }
}
