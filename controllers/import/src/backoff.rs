//! # Exponential Backoff
//!
//! Requeue delays for claims whose reconciliation failed transiently
//! (store unreachable, optimistic-lock conflict, ...).
//!
//! Sequence with the controller defaults: 1s, 2s, 4s, 8s, ... capped at 5m.
//! A successful reconciliation resets the claim's sequence.

use cdi_api::ClaimKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Exponential backoff calculator
///
/// Each call to `next_backoff()` returns the current delay and doubles it,
/// never exceeding `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay returned by the next call
    current: Duration,
    /// Upper bound
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new backoff starting at `min` and capped at `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { current: min, max }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        result
    }
}

/// Per-claim backoff state shared by all workers.
#[derive(Debug, Clone)]
pub struct BackoffRegistry {
    min: Duration,
    max: Duration,
    states: Arc<Mutex<HashMap<ClaimKey, ExponentialBackoff>>>,
}

impl Default for BackoffRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

impl BackoffRegistry {
    /// Create a registry whose sequences run from `min` to `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Delay before retrying `key` after another failure.
    pub fn next_delay(&self, key: &ClaimKey) -> Duration {
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        states
            .entry(key.clone())
            .or_insert_with(|| ExponentialBackoff::new(self.min, self.max))
            .next_backoff()
    }

    /// Forget the failure history of `key`.
    pub fn reset(&self, key: &ClaimKey) {
        let mut states = self.states.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        states.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(300));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
    }

    #[test]
    fn test_exponential_backoff_max_cap() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
        // Next would be 16s, capped at 10s
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
    }

    #[test]
    fn test_registry_tracks_claims_independently() {
        let registry = BackoffRegistry::default();
        let a = ClaimKey::new("default", "a");
        let b = ClaimKey::new("default", "b");

        assert_eq!(registry.next_delay(&a), Duration::from_secs(1));
        assert_eq!(registry.next_delay(&a), Duration::from_secs(2));
        assert_eq!(registry.next_delay(&b), Duration::from_secs(1));

        registry.reset(&a);
        assert_eq!(registry.next_delay(&a), Duration::from_secs(1));
    }
}
