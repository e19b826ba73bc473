use std::time::Duration;

use tokio::time::Instant;

/// In-memory TTL cache for a single clonable value.
///
/// Uses the tokio clock so paused-time tests can step past the TTL.
pub struct ResponseCache<T: Clone> {
    value: Option<T>,
    cached_at: Option<Instant>,
    ttl: Duration,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            value: None,
            cached_at: None,
            ttl,
        }
    }

    /// Returns the cached value only when still within TTL.
    pub fn get(&self) -> Option<T> {
        if self.is_fresh() {
            self.value.clone()
        } else {
            None
        }
    }

    /// Last stored value regardless of age.
    pub fn last(&self) -> Option<T> {
        self.value.clone()
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(value);
        self.cached_at = Some(Instant::now());
    }

    pub fn invalidate(&mut self) {
        self.value = None;
        self.cached_at = None;
    }

    pub fn is_fresh(&self) -> bool {
        match (self.value.as_ref(), self.cached_at) {
            (Some(_), Some(cached_at)) => cached_at.elapsed() <= self.ttl,
            _ => false,
        }
    }
}
