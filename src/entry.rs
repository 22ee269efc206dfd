//! Per-object bookkeeping for pooled resources

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::eviction::AgingPolicy;

/// Which list of its cluster an object currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectState {
    Used,
    Free,
}

/// One pooled resource plus its lifecycle timestamps.
pub(crate) struct PooledEntry<T> {
    resource: Arc<T>,
    state: ObjectState,
    created_at: Instant,
    entered_state_at: Instant,
    released_at: Option<Instant>,
}

impl<T> PooledEntry<T> {
    /// Wrap a freshly acquired resource; it starts out checked out.
    pub fn new_used(resource: Arc<T>) -> Self {
        let now = Instant::now();
        Self {
            resource,
            state: ObjectState::Used,
            created_at: now,
            entered_state_at: now,
            released_at: None,
        }
    }

    pub fn resource(&self) -> &Arc<T> {
        &self.resource
    }

    pub fn into_resource(self) -> Arc<T> {
        self.resource
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn released_at(&self) -> Option<Instant> {
        self.released_at
    }

    pub fn mark_used(&mut self) {
        self.transition(ObjectState::Used, Instant::now());
    }

    pub fn mark_free(&mut self) {
        let now = Instant::now();
        self.transition(ObjectState::Free, now);
        self.released_at = Some(now);
    }

    fn transition(&mut self, state: ObjectState, now: Instant) {
        self.state = state;
        self.entered_state_at = now;
    }

    pub fn time_in_state(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entered_state_at)
    }

    /// True when the object has stayed in its current state longer than the policy allows.
    pub fn is_expired(&self, policy: &AgingPolicy, now: Instant) -> bool {
        match policy.limit_for(self.state) {
            Some(limit) => self.time_in_state(now) > limit,
            None => false,
        }
    }
}
