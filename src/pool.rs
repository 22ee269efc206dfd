//! Keyed pool: connection key registry, retrying checkout and background sweeps

use std::collections::HashMap;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::cluster::{Checkout, Cluster, Factory, SweepReport};
use crate::config::PoolConfiguration;
use crate::descriptor::ConnectionDescriptor;
use crate::errors::{PoolError, PoolResult};
use crate::health::{ClusterStats, HealthStatus};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::poolable::Poolable;
use crate::tuning::{PropertySource, TuningParameters, short_type_name};

/// A checked-out resource that is handed back to its pool when dropped
pub struct PooledObject<T: Poolable> {
    resource: Arc<T>,
    pool: Arc<PoolInner<T>>,
    detached: bool,
}

impl<T: Poolable> PooledObject<T> {
    fn new(resource: Arc<T>, pool: Arc<PoolInner<T>>) -> Self {
        Self {
            resource,
            pool,
            detached: false,
        }
    }

    /// Take the resource without handing it back on drop.
    ///
    /// The pool keeps counting it as used until it is released explicitly
    /// or reclaimed by a sweep.
    pub fn detach(mut self) -> Arc<T> {
        self.detached = true;
        Arc::clone(&self.resource)
    }
}

impl<T: Poolable> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<T: Poolable> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        match self.pool.release_object(&self.resource) {
            Ok(()) => {}
            Err(PoolError::ObjectNotFound { key }) => {
                debug!(key = %key, id = %self.resource.unique_id(), "Lease dropped after its object was reclaimed");
            }
            Err(err) => {
                warn!(error = %err, "Returning leased object failed");
            }
        }
    }
}

struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

enum Step<T> {
    Ready(Arc<T>),
    Wait(Duration),
}

pub(crate) struct PoolInner<T: Poolable> {
    name: &'static str,
    clusters: DashMap<String, Arc<Cluster<T>>>,
    factory: Box<Factory<T>>,
    config: PoolConfiguration,
    metrics: MetricsTracker,
    closed: AtomicBool,
}

impl<T: Poolable> PoolInner<T> {
    fn ensure_open(&self) -> PoolResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Find or create the cluster for `key`. The registry shard lock is held
    /// only for the map operation.
    fn cluster_for(&self, key: &str) -> Arc<Cluster<T>> {
        if let Some(cluster) = self.clusters.get(key) {
            return Arc::clone(cluster.value());
        }
        let cluster = self.clusters.entry(key.to_string()).or_insert_with(|| {
            debug!(pool = self.name, key = %key, max_objects = ?self.config.max_pool_size, "Creating cluster");
            Arc::new(Cluster::new(key.to_string(), self.config.max_pool_size))
        });
        Arc::clone(cluster.value())
    }

    fn existing_cluster(&self, key: &str) -> Option<Arc<Cluster<T>>> {
        self.clusters.get(key).map(|cluster| Arc::clone(cluster.value()))
    }

    fn snapshot(&self) -> Vec<Arc<Cluster<T>>> {
        self.clusters
            .iter()
            .map(|cluster| Arc::clone(cluster.value()))
            .collect()
    }

    /// One cluster attempt. On a miss, either the backoff to wait or the
    /// exhaustion error once `attempts` reaches the retry budget.
    fn attempt(
        &self,
        cluster: &Cluster<T>,
        descriptor: &T::Descriptor,
        attempts: &mut u32,
    ) -> PoolResult<Step<T>> {
        self.ensure_open()?;

        let checkout = cluster.get_object(descriptor, &*self.factory).inspect_err(|err| {
            if matches!(err, PoolError::Acquire { .. }) {
                self.metrics.acquire_failures.fetch_add(1, Ordering::Relaxed);
            }
        })?;

        match checkout {
            Checkout::Reused(resource) => {
                self.metrics.total_retrieved.fetch_add(1, Ordering::Relaxed);
                Ok(Step::Ready(resource))
            }
            Checkout::Created(resource) => {
                self.metrics.total_created.fetch_add(1, Ordering::Relaxed);
                self.metrics.total_retrieved.fetch_add(1, Ordering::Relaxed);
                Ok(Step::Ready(resource))
            }
            Checkout::Exhausted => {
                self.metrics.exhausted_attempts.fetch_add(1, Ordering::Relaxed);
                *attempts += 1;
                if *attempts >= self.config.retry.max_attempts {
                    self.metrics.retries_exhausted.fetch_add(1, Ordering::Relaxed);
                    warn!(pool = self.name, key = %cluster.key(), attempts = *attempts, "Could not obtain pooled object");
                    return Err(PoolError::CouldNotObtain {
                        key: cluster.key().to_string(),
                        attempts: *attempts,
                    });
                }
                let wait = self.config.retry.sleep_for(*attempts);
                debug!(
                    pool = self.name,
                    key = %cluster.key(),
                    attempt = *attempts,
                    sleep_ms = wait.as_millis() as u64,
                    "Cluster at capacity, backing off"
                );
                Ok(Step::Wait(wait))
            }
        }
    }

    fn release_object(&self, resource: &T) -> PoolResult<()> {
        let key = resource.descriptor().key();
        let Some(cluster) = self.existing_cluster(&key) else {
            return Err(PoolError::ObjectNotFound { key });
        };
        let id = resource.unique_id();

        if self.closed.load(Ordering::Acquire) {
            let Some(resource) = cluster.remove_used(id) else {
                return Err(PoolError::ObjectNotFound { key });
            };
            if let Err(err) = resource.release() {
                self.metrics.release_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, id = %id, error = %err, "Release after shutdown failed");
            }
            self.metrics.total_released.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        if !cluster.release_object(id) {
            return Err(PoolError::ObjectNotFound { key });
        }
        self.metrics.total_released.fetch_add(1, Ordering::Relaxed);

        // lost a race with shutdown: do not leave the object idle in a closed pool
        if self.closed.load(Ordering::Acquire) {
            let report = cluster.drain_free();
            self.metrics.record_sweep(&report);
        }
        Ok(())
    }

    /// Sweep every registered cluster. A panic inside one cluster's sweep is
    /// contained so the remaining clusters are still swept.
    fn sweep_all(&self) -> SweepReport {
        let mut total = SweepReport::default();
        for cluster in self.snapshot() {
            match panic::catch_unwind(AssertUnwindSafe(|| cluster.sweep(&self.config.aging))) {
                Ok(report) => {
                    if !report.is_empty() {
                        debug!(
                            pool = self.name,
                            key = %cluster.key(),
                            free_evicted = report.free_evicted,
                            used_reclaimed = report.used_reclaimed,
                            "Swept cluster"
                        );
                    }
                    total.merge(report);
                }
                Err(_) => {
                    warn!(pool = self.name, key = %cluster.key(), "Sweep of cluster panicked");
                }
            }
        }
        self.metrics.record_sweep(&total);
        total
    }
}

/// Thread-safe pool of [`Poolable`] resources partitioned by connection key
///
/// Each distinct [`ConnectionDescriptor::key`] gets its own cluster with its
/// own capacity bound and lock, so unrelated keys never wait on each other.
/// A dedicated thread sweeps all clusters on [`PoolConfiguration::sweep_interval`]
/// until the pool is shut down or dropped.
pub struct Pool<T: Poolable> {
    inner: Arc<PoolInner<T>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<T: Poolable> Pool<T> {
    /// Create a pool that builds new resources with `factory`
    pub fn new<F>(factory: F, config: PoolConfiguration) -> Self
    where
        F: Fn(&T::Descriptor) -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(PoolInner {
            name: short_type_name::<T>(),
            clusters: DashMap::new(),
            factory: Box::new(factory),
            config,
            metrics: MetricsTracker::new(),
            closed: AtomicBool::new(false),
        });
        let sweeper = inner
            .config
            .sweep_interval
            .and_then(|interval| Self::spawn_sweeper(&inner, interval));
        Self {
            inner,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Create a pool tuned by `"{TypeName}_*"` properties from `source`
    pub fn from_properties<F>(source: &dyn PropertySource, factory: F) -> Self
    where
        F: Fn(&T::Descriptor) -> T + Send + Sync + 'static,
    {
        let tuning = TuningParameters::resolve::<T>(source);
        debug!(pool = short_type_name::<T>(), ?tuning, "Resolved tuning parameters");
        Self::new(factory, PoolConfiguration::from_tuning(&tuning))
    }

    fn spawn_sweeper(inner: &Arc<PoolInner<T>>, interval: Duration) -> Option<Sweeper> {
        let (stop, stopped) = channel::bounded::<()>(1);
        let pool = Arc::clone(inner);
        let spawned = thread::Builder::new()
            .name(format!("{}-sweeper", inner.name))
            .spawn(move || {
                debug!(pool = pool.name, interval_ms = interval.as_millis() as u64, "Sweeper started");
                loop {
                    pool.sweep_all();
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(pool = pool.name, "Sweeper stopped");
            });

        match spawned {
            Ok(handle) => Some(Sweeper { stop, handle }),
            Err(err) => {
                warn!(pool = inner.name, error = %err, "Could not start sweeper thread");
                None
            }
        }
    }

    /// Get an object for `descriptor`, blocking between retries.
    ///
    /// Makes at most `retry.max_attempts` cluster attempts, sleeping a
    /// jittered backoff between them, then fails with
    /// [`PoolError::CouldNotObtain`]. Acquisition failures are returned at once.
    pub fn get_object(&self, descriptor: &T::Descriptor) -> PoolResult<Arc<T>> {
        self.inner.ensure_open()?;
        let cluster = self.inner.cluster_for(&descriptor.key());
        let mut attempts = 0;
        loop {
            match self.inner.attempt(&cluster, descriptor, &mut attempts)? {
                Step::Ready(resource) => return Ok(resource),
                Step::Wait(wait) => thread::sleep(wait),
            }
        }
    }

    /// Get an object asynchronously, sleeping on the tokio timer between retries.
    ///
    /// Creating a new resource still runs `acquire()` inline on the calling task.
    pub async fn get_object_async(&self, descriptor: &T::Descriptor) -> PoolResult<Arc<T>> {
        self.inner.ensure_open()?;
        let cluster = self.inner.cluster_for(&descriptor.key());
        let mut attempts = 0;
        loop {
            match self.inner.attempt(&cluster, descriptor, &mut attempts)? {
                Step::Ready(resource) => return Ok(resource),
                Step::Wait(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Hand a resource back to its cluster.
    ///
    /// Fails with [`PoolError::ObjectNotFound`] when the pool is not tracking
    /// it as used: unknown key, double release, or already reclaimed by a sweep.
    pub fn release_object(&self, resource: &T) -> PoolResult<()> {
        trace!(pool = self.inner.name, id = %resource.unique_id(), "Releasing object");
        self.inner.release_object(resource)
    }

    /// Like [`get_object`](Self::get_object), but the object goes back to the pool on drop
    pub fn lease(&self, descriptor: &T::Descriptor) -> PoolResult<PooledObject<T>> {
        let resource = self.get_object(descriptor)?;
        Ok(PooledObject::new(resource, Arc::clone(&self.inner)))
    }

    pub async fn lease_async(&self, descriptor: &T::Descriptor) -> PoolResult<PooledObject<T>> {
        let resource = self.get_object_async(descriptor).await?;
        Ok(PooledObject::new(resource, Arc::clone(&self.inner)))
    }

    /// Run one sweep pass over every cluster now
    pub fn sweep(&self) -> SweepReport {
        self.inner.sweep_all()
    }

    /// Stop the sweeper, release every free object and refuse further checkouts.
    ///
    /// Objects still checked out stay tracked; releasing them afterwards tears
    /// them down instead of re-pooling them. Safe to call more than once.
    pub fn shutdown(&self) -> SweepReport {
        self.inner.closed.store(true, Ordering::Release);

        if let Some(sweeper) = self.sweeper.lock().take() {
            let _ = sweeper.stop.try_send(());
            if sweeper.handle.join().is_err() {
                warn!(pool = self.inner.name, "Sweeper thread panicked");
            }
        }

        let mut total = SweepReport::default();
        for cluster in self.inner.snapshot() {
            total.merge(cluster.drain_free());
        }
        self.inner.metrics.record_sweep(&total);
        if !total.is_empty() {
            debug!(pool = self.inner.name, released = total.free_evicted, "Pool shut down");
        }
        total
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.inner.config
    }

    /// Short type name of the pooled resource
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Stats for the cluster serving `descriptor`, if one exists
    pub fn cluster_stats(&self, descriptor: &T::Descriptor) -> Option<ClusterStats> {
        self.inner
            .existing_cluster(&descriptor.key())
            .map(|cluster| cluster.stats())
    }

    fn all_cluster_stats(&self) -> Vec<ClusterStats> {
        let mut stats: Vec<_> = self
            .inner
            .snapshot()
            .iter()
            .map(|cluster| cluster.stats())
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::new(self.all_cluster_stats())
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        let stats = self.all_cluster_stats();
        let used = stats.iter().map(|s| s.used).sum();
        let free = stats.iter().map(|s| s.free).sum();
        self.inner.metrics.get_metrics(stats.len(), used, free)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }
}

impl<T: Poolable> Drop for Pool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
