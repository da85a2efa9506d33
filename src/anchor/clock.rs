use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// How far ahead of the local clock an observed stamp may sit and still move
/// the floor. Anything further out is treated as a bogus client value.
pub const MAX_FUTURE_SKEW_MS: i64 = 24 * 60 * 60 * 1000;

/// Wall-clock millisecond stamps that never repeat and never go backwards.
///
/// Two writes landing in the same millisecond still get distinct, ordered
/// stamps, so `lastUpdated` comparisons stay strict.
#[derive(Debug, Default)]
pub struct StampClock {
    last: AtomicI64,
}

impl StampClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Raise the floor so later stamps beat a value seen elsewhere. Returns
    /// `false` when the stamp is too far in the future to trust.
    pub fn observe(&self, stamp: i64) -> bool {
        let limit = Utc::now()
            .timestamp_millis()
            .saturating_add(MAX_FUTURE_SKEW_MS);
        if stamp > limit {
            return false;
        }
        self.last.fetch_max(stamp, Ordering::AcqRel);
        true
    }
}
