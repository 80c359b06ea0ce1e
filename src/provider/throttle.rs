//! Minimum spacing between requests to the same provider and model.
//!
//! Each reservation books the next free slot for its key, so concurrent callers
//! queue up behind each other instead of all waking at once.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Throttle key for a provider and model, case-insensitive
pub fn throttle_key(provider: &str, model: &str) -> String {
    format!("{}:{}", provider.trim(), model.trim()).to_lowercase()
}

#[derive(Debug)]
pub struct RequestThrottle {
    min_interval: Duration,
    next_slot: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl RequestThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Book a request slot for `key` and return how long to wait for it
    pub fn reserve(&self, key: &str) -> Duration {
        let now = self.clock.now();
        let interval = chrono::Duration::from_std(self.min_interval).unwrap_or(chrono::Duration::zero());

        let mut slots = self.next_slot.lock();
        let slot = match slots.get(key) {
            Some(next) if *next > now => *next,
            _ => now,
        };
        slots.insert(key.to_string(), slot + interval);

        (slot - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Wait until a request for `key` may be sent
    pub async fn acquire(&self, key: &str) {
        let wait = self.reserve(key);
        if !wait.is_zero() {
            tracing::debug!(key = %key, wait_ms = wait.as_millis() as u64, "Throttling provider request");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_key_is_case_insensitive() {
        assert_eq!(throttle_key("Groq", "Llama-3 "), "groq:llama-3");
    }

    #[test]
    fn test_reservations_are_spaced() {
        let clock = Arc::new(ManualClock::default());
        let throttle = RequestThrottle::with_clock(Duration::from_millis(500), clock.clone());

        assert_eq!(throttle.reserve("openai:gpt"), Duration::ZERO);
        assert_eq!(throttle.reserve("openai:gpt"), Duration::from_millis(500));
        assert_eq!(throttle.reserve("openai:gpt"), Duration::from_millis(1000));
        // Independent keys do not interfere
        assert_eq!(throttle.reserve("groq:llama"), Duration::ZERO);

        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(throttle.reserve("openai:gpt"), Duration::ZERO);
    }

    #[test]
    fn test_zero_interval_never_waits() {
        let throttle = RequestThrottle::new(Duration::ZERO);
        assert_eq!(throttle.reserve("k"), Duration::ZERO);
        assert_eq!(throttle.reserve("k"), Duration::ZERO);
    }
}
