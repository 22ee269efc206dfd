//! All pooled instances for one connection key

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::entry::{ObjectState, PooledEntry};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::AgingPolicy;
use crate::health::ClusterStats;
use crate::poolable::{Poolable, ResourceId};

/// Builds a new, not yet acquired resource for a descriptor.
pub type Factory<T> = dyn Fn(&<T as Poolable>::Descriptor) -> T + Send + Sync;

/// Outcome of a single checkout attempt against a cluster.
pub enum Checkout<T> {
    /// A free instance was handed out again.
    Reused(Arc<T>),
    /// A new instance was built and acquired.
    Created(Arc<T>),
    /// Every slot is taken.
    Exhausted,
}

impl<T> Checkout<T> {
    pub fn into_resource(self) -> Option<Arc<T>> {
        match self {
            Self::Reused(resource) | Self::Created(resource) => Some(resource),
            Self::Exhausted => None,
        }
    }
}

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SweepReport {
    /// Idle objects removed from the free list
    pub free_evicted: usize,
    /// Over-held objects force-released from the used list
    pub used_reclaimed: usize,
    /// `release()` calls that returned an error
    pub release_failures: usize,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.free_evicted += other.free_evicted;
        self.used_reclaimed += other.used_reclaimed;
        self.release_failures += other.release_failures;
    }

    pub fn is_empty(&self) -> bool {
        self.free_evicted == 0 && self.used_reclaimed == 0
    }
}

struct Lists<T> {
    free: VecDeque<PooledEntry<T>>,
    used: Vec<PooledEntry<T>>,
}

impl<T> Lists<T> {
    fn len(&self) -> usize {
        self.free.len() + self.used.len()
    }
}

impl<T: Poolable> Lists<T> {
    fn tracks(&self, id: ResourceId) -> bool {
        self.free
            .iter()
            .chain(self.used.iter())
            .any(|entry| entry.resource().unique_id() == id)
    }
}

/// Free and used lists for one connection key, bounded by `max_objects`.
///
/// Every operation holds the cluster lock for its full decision phase. On
/// the create path that includes building and acquiring the new resource,
/// so creation for one key is serialized and can never overshoot capacity.
pub struct Cluster<T: Poolable> {
    key: String,
    max_objects: Option<usize>,
    lists: Mutex<Lists<T>>,
}

impl<T: Poolable> Cluster<T> {
    pub fn new(key: String, max_objects: Option<usize>) -> Self {
        Self {
            key,
            max_objects,
            lists: Mutex::new(Lists {
                free: VecDeque::new(),
                used: Vec::new(),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn max_objects(&self) -> Option<usize> {
        self.max_objects
    }

    /// Hand out a free instance, create one if under capacity, or report exhaustion.
    ///
    /// A failing `acquire()` is returned as [`PoolError::Acquire`] and leaves
    /// the cluster untouched.
    pub fn get_object(
        &self,
        descriptor: &T::Descriptor,
        factory: &Factory<T>,
    ) -> PoolResult<Checkout<T>> {
        let mut lists = self.lists.lock();

        if let Some(mut entry) = lists.free.pop_front() {
            entry.mark_used();
            let resource = Arc::clone(entry.resource());
            lists.used.push(entry);
            trace!(key = %self.key, id = %resource.unique_id(), "Reused free object");
            return Ok(Checkout::Reused(resource));
        }

        if let Some(max) = self.max_objects
            && lists.len() >= max
        {
            return Ok(Checkout::Exhausted);
        }

        let mut resource = factory(descriptor);
        if let Err(err) = resource.acquire() {
            warn!(key = %self.key, descriptor = ?descriptor, error = %err, "Resource acquisition failed");
            return Err(PoolError::acquire(format!("{descriptor:?}"), err));
        }

        let id = resource.unique_id();
        if lists.tracks(id) {
            if let Err(err) = resource.release() {
                warn!(key = %self.key, id = %id, error = %err, "Release of duplicate resource failed");
            }
            return Err(PoolError::DuplicateIdentity {
                key: self.key.clone(),
                id,
            });
        }

        let resource = Arc::new(resource);
        lists.used.push(PooledEntry::new_used(Arc::clone(&resource)));
        trace!(key = %self.key, id = %id, total = lists.len(), "Created pooled object");
        Ok(Checkout::Created(resource))
    }

    /// Move the used instance with this id back to the free list.
    ///
    /// Returns `false` when the cluster is not tracking it as used.
    pub fn release_object(&self, id: ResourceId) -> bool {
        let mut lists = self.lists.lock();
        let Some(pos) = lists
            .used
            .iter()
            .position(|entry| entry.resource().unique_id() == id)
        else {
            return false;
        };

        let mut entry = lists.used.swap_remove(pos);
        debug_assert_eq!(entry.state(), ObjectState::Used);
        entry.mark_free();
        lists.free.push_back(entry);
        trace!(key = %self.key, id = %id, "Released object to free list");
        true
    }

    /// Stop tracking a used instance without returning it to the free list.
    pub fn remove_used(&self, id: ResourceId) -> Option<Arc<T>> {
        let mut lists = self.lists.lock();
        let pos = lists
            .used
            .iter()
            .position(|entry| entry.resource().unique_id() == id)?;
        Some(lists.used.swap_remove(pos).into_resource())
    }

    /// Empty the free list and release every idle instance.
    pub fn drain_free(&self) -> SweepReport {
        let drained: Vec<_> = self.lists.lock().free.drain(..).collect();
        let mut report = SweepReport {
            free_evicted: drained.len(),
            ..Default::default()
        };
        report.release_failures = self.release_all(drained);
        report
    }

    pub fn sweep(&self, policy: &AgingPolicy) -> SweepReport {
        self.sweep_at(policy, Instant::now())
    }

    /// Evict free objects idle past the free threshold and reclaim used objects
    /// held past the used threshold, as seen from `now`.
    ///
    /// Both kinds are released. Teardown runs after the lock is dropped; the
    /// entries are already unlinked at that point.
    pub fn sweep_at(&self, policy: &AgingPolicy, now: Instant) -> SweepReport {
        if !policy.is_enabled() {
            return SweepReport::default();
        }

        let (evicted, reclaimed) = {
            let mut lists = self.lists.lock();

            let (evicted, kept): (VecDeque<_>, VecDeque<_>) = lists
                .free
                .drain(..)
                .partition(|entry| entry.is_expired(policy, now));
            lists.free = kept;

            let (reclaimed, kept): (Vec<_>, Vec<_>) = lists
                .used
                .drain(..)
                .partition(|entry| entry.is_expired(policy, now));
            lists.used = kept;

            (evicted, reclaimed)
        };

        for entry in &reclaimed {
            warn!(
                key = %self.key,
                id = %entry.resource().unique_id(),
                held_ms = entry.time_in_state(now).as_millis() as u64,
                "Reclaiming object held past used aging time"
            );
        }

        let mut report = SweepReport {
            free_evicted: evicted.len(),
            used_reclaimed: reclaimed.len(),
            release_failures: 0,
        };
        report.release_failures = self.release_all(evicted.into_iter().chain(reclaimed));
        report
    }

    fn release_all<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = PooledEntry<T>>,
    {
        let mut failures = 0;
        // entries are already out of the lists, so every one gets its release call
        for entry in entries {
            let resource = entry.into_resource();
            match panic::catch_unwind(AssertUnwindSafe(|| resource.release())) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(key = %self.key, id = %resource.unique_id(), error = %err, "Release during sweep failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(key = %self.key, id = %resource.unique_id(), "Release during sweep panicked");
                }
            }
        }
        failures
    }

    pub fn stats(&self) -> ClusterStats {
        let now = Instant::now();
        let lists = self.lists.lock();
        let oldest_object_age = lists
            .free
            .iter()
            .chain(lists.used.iter())
            .map(|entry| now.saturating_duration_since(entry.created_at()))
            .max();
        let longest_hold = lists.used.iter().map(|entry| entry.time_in_state(now)).max();
        let longest_idle = lists
            .free
            .iter()
            .filter_map(PooledEntry::released_at)
            .map(|at| now.saturating_duration_since(at))
            .max();
        ClusterStats {
            key: self.key.clone(),
            free: lists.free.len(),
            used: lists.used.len(),
            max_objects: self.max_objects,
            oldest_object_age,
            longest_hold,
            longest_idle,
        }
    }
}
