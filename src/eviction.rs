//! Aging policy applied by cluster sweeps

use std::time::Duration;

use crate::entry::ObjectState;

/// How long an object may stay in one state before a sweep removes it.
///
/// `None` disables that half of the sweep.
///
/// # Examples
///
/// ```
/// use keyed_pool::AgingPolicy;
/// use std::time::Duration;
///
/// let policy = AgingPolicy::new()
///     .with_free_aging_time(Duration::from_secs(60))
///     .with_used_aging_time(Duration::from_secs(600));
///
/// assert_eq!(policy.free_aging_time, Some(Duration::from_secs(60)));
/// assert!(!AgingPolicy::disabled().is_enabled());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgingPolicy {
    /// Maximum time a checked-out object may be held before it is forcibly reclaimed.
    pub used_aging_time: Option<Duration>,

    /// Maximum time an object may sit idle in the free list.
    pub free_aging_time: Option<Duration>,
}

impl AgingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_used_aging_time(mut self, limit: Duration) -> Self {
        self.used_aging_time = Some(limit);
        self
    }

    pub fn with_free_aging_time(mut self, limit: Duration) -> Self {
        self.free_aging_time = Some(limit);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.used_aging_time.is_some() || self.free_aging_time.is_some()
    }

    /// Threshold for objects currently in `state`.
    pub fn limit_for(&self, state: ObjectState) -> Option<Duration> {
        match state {
            ObjectState::Used => self.used_aging_time,
            ObjectState::Free => self.free_aging_time,
        }
    }

    /// Build from milliseconds where any negative value disables the threshold.
    pub fn from_millis(used_aging_ms: i64, free_aging_ms: i64) -> Self {
        Self {
            used_aging_time: millis_limit(used_aging_ms),
            free_aging_time: millis_limit(free_aging_ms),
        }
    }
}

fn millis_limit(ms: i64) -> Option<Duration> {
    u64::try_from(ms).ok().map(Duration::from_millis)
}
