//! Behavioural properties of the keyed pool under contention and aging.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use keyed_pool::{
    BackoffGrowth, ConnectionInfo, Pool, PoolConfiguration, PoolError, Poolable, ResourceId,
    RetryPolicy,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
#[error("refused")]
struct Refused;

struct MockConn {
    info: ConnectionInfo,
    id: ResourceId,
    acquired: AtomicBool,
    releases: AtomicUsize,
}

impl Poolable for MockConn {
    type Descriptor = ConnectionInfo;
    type Error = Refused;

    fn descriptor(&self) -> &ConnectionInfo {
        &self.info
    }

    fn unique_id(&self) -> ResourceId {
        self.id
    }

    fn acquire(&mut self) -> Result<(), Refused> {
        if self.info.server() == "unreachable" {
            return Err(Refused);
        }
        self.acquired.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), Refused> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if self.info.server() == "flaky" {
            panic!("driver crashed while closing {}", self.id);
        }
        Ok(())
    }
}

fn counting_pool(config: PoolConfiguration) -> (Pool<MockConn>, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let pool = Pool::<MockConn>::new(
        move |info: &ConnectionInfo| {
            counter.fetch_add(1, Ordering::SeqCst);
            MockConn {
                info: info.clone(),
                id: ResourceId::next(),
                acquired: AtomicBool::new(false),
                releases: AtomicUsize::new(0),
            }
        },
        config,
    );
    (pool, created)
}

fn db(name: &str) -> ConnectionInfo {
    ConnectionInfo::new("db-01", name, "svc", "secret")
}

fn bounded(max: usize) -> PoolConfiguration {
    PoolConfiguration::new()
        .with_max_pool_size(max)
        .with_sleep_time_base(10)
        .without_sweeper()
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

#[test]
fn capacity_never_exceeded_under_contention() {
    let retry = RetryPolicy::default()
        .with_max_attempts(500)
        .with_sleep_time_base(1)
        .with_growth(BackoffGrowth::Doubling)
        .with_max_sleep(Duration::from_millis(5));
    let config = PoolConfiguration::new()
        .with_max_pool_size(3)
        .with_retry_policy(retry)
        .without_sweeper();
    let (pool, created) = counting_pool(config);
    let pool = Arc::new(pool);
    let info = db("lrm");
    let start = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let info = info.clone();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..40 {
                    let conn = pool.get_object(&info).unwrap();
                    let stats = pool.cluster_stats(&info).unwrap();
                    assert!(stats.total() <= 3, "cluster grew to {}", stats.total());
                    thread::yield_now();
                    pool.release_object(&conn).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(created.load(Ordering::SeqCst) <= 3);
    let stats = pool.cluster_stats(&info).unwrap();
    assert_eq!(stats.used, 0);
    assert!(stats.free <= 3);
}

#[test]
fn no_duplicate_identity_across_lists() {
    let (pool, _) = counting_pool(bounded(4));
    let info = db("lrm");

    let held: Vec<_> = (0..4).map(|_| pool.get_object(&info).unwrap()).collect();
    pool.release_object(&held[1]).unwrap();
    pool.release_object(&held[3]).unwrap();
    let again = pool.get_object(&info).unwrap();

    let mut ids = HashSet::new();
    for conn in [&held[0], &held[2], &again] {
        assert!(ids.insert(conn.unique_id()));
    }
    let stats = pool.cluster_stats(&info).unwrap();
    assert_eq!((stats.used, stats.free), (3, 1));
}

#[test]
fn distinct_keys_have_independent_capacity() {
    let (pool, created) = counting_pool(bounded(1));
    let _lrm = pool.get_object(&db("lrm")).unwrap();
    let _slk = pool.get_object(&db("slk")).unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(pool.health_status().clusters.len(), 2);
}

// ---------------------------------------------------------------------------
// Retry budget
// ---------------------------------------------------------------------------

#[test]
fn retry_exhaustion_is_fatal_after_three_attempts() {
    let (pool, _) = counting_pool(bounded(1));
    let info = db("lrm");
    let _held = pool.get_object(&info).unwrap();

    let err = pool.get_object(&info).err().unwrap();
    match err {
        PoolError::CouldNotObtain { ref key, attempts } => {
            assert_eq!(attempts, 3);
            assert_eq!(key, &keyed_pool::ConnectionDescriptor::key(&info));
        }
        other => panic!("unexpected error: {other}"),
    }

    let metrics = pool.metrics();
    assert_eq!(metrics.exhausted_attempts, 3);
    assert_eq!(metrics.retries_exhausted, 1);
}

#[test]
fn exhaustion_then_release_unblocks_waiter() {
    let config = PoolConfiguration::new()
        .with_max_pool_size(2)
        .with_sleep_time_base(20)
        .without_sweeper();
    let (pool, created) = counting_pool(config);
    let pool = Arc::new(pool);
    let info = db("lrm");

    let a = pool.get_object(&info).unwrap();
    let _b = pool.get_object(&info).unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        let info = info.clone();
        thread::spawn(move || pool.get_object(&info))
    };

    // first backoff is 10..20ms, the second 200..400ms
    thread::sleep(Duration::from_millis(30));
    pool.release_object(&a).unwrap();

    let c = waiter.join().unwrap().unwrap();
    assert_eq!(c.unique_id(), a.unique_id());
    assert_eq!(created.load(Ordering::SeqCst), 2);

    let stats = pool.cluster_stats(&info).unwrap();
    assert_eq!((stats.used, stats.free), (2, 0));
}

#[test]
fn concrete_two_slot_scenario() {
    let (pool, _) = counting_pool(bounded(2));
    let pool = Arc::new(pool);
    let info = db("lrm");

    let a = pool.get_object(&info).unwrap();
    let b = pool.get_object(&info).unwrap();
    let stats = pool.cluster_stats(&info).unwrap();
    assert_eq!((stats.used, stats.free), (2, 0));

    let releaser = {
        let pool = Arc::clone(&pool);
        let a = Arc::clone(&a);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(2));
            pool.release_object(&a).unwrap();
        })
    };

    let c = pool.get_object(&info).unwrap();
    releaser.join().unwrap();

    assert_eq!(c.unique_id(), a.unique_id());
    assert_ne!(c.unique_id(), b.unique_id());
    let stats = pool.cluster_stats(&info).unwrap();
    assert_eq!((stats.used, stats.free), (2, 0));
}

#[test]
fn acquisition_failure_is_not_retried() {
    let (pool, created) = counting_pool(bounded(2));
    let info = ConnectionInfo::new("unreachable", "lrm", "svc", "secret");

    let err = pool.get_object(&info).err().unwrap();
    assert!(matches!(err, PoolError::Acquire { .. }));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.metrics().acquire_failures, 1);
    assert_eq!(pool.cluster_stats(&info).unwrap().total(), 0);
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

#[test]
fn release_of_untracked_key_fails_without_mutation() {
    let (pool, _) = counting_pool(bounded(2));
    let tracked = db("lrm");
    let held = pool.get_object(&tracked).unwrap();

    let stranger = MockConn {
        info: db("never-seen"),
        id: ResourceId::next(),
        acquired: AtomicBool::new(true),
        releases: AtomicUsize::new(0),
    };
    let err = pool.release_object(&stranger).err().unwrap();
    assert!(matches!(err, PoolError::ObjectNotFound { .. }));

    assert!(pool.cluster_stats(&stranger.info).is_none());
    let stats = pool.cluster_stats(&tracked).unwrap();
    assert_eq!((stats.used, stats.free), (1, 0));
    assert_eq!(held.releases.load(Ordering::SeqCst), 0);
}

#[test]
fn double_release_fails() {
    let (pool, _) = counting_pool(bounded(2));
    let info = db("lrm");
    let conn = pool.get_object(&info).unwrap();

    pool.release_object(&conn).unwrap();
    assert!(matches!(
        pool.release_object(&conn),
        Err(PoolError::ObjectNotFound { .. })
    ));
}

// ---------------------------------------------------------------------------
// Aging sweeps
// ---------------------------------------------------------------------------

#[test]
fn sweep_reclaims_idle_free_objects() {
    let config = bounded(2).with_free_aging_time(Duration::from_millis(30));
    let (pool, created) = counting_pool(config);
    let info = db("lrm");

    let first = pool.get_object(&info).unwrap();
    pool.release_object(&first).unwrap();

    thread::sleep(Duration::from_millis(60));
    let report = pool.sweep();
    assert_eq!(report.free_evicted, 1);
    assert_eq!(first.releases.load(Ordering::SeqCst), 1);

    let fresh = pool.get_object(&info).unwrap();
    assert_ne!(fresh.unique_id(), first.unique_id());
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn sweep_force_releases_stale_used_objects() {
    let config = bounded(2).with_used_aging_time(Duration::from_millis(30));
    let (pool, _) = counting_pool(config);
    let info = db("lrm");

    let held = pool.get_object(&info).unwrap();
    thread::sleep(Duration::from_millis(60));

    let report = pool.sweep();
    assert_eq!(report.used_reclaimed, 1);
    assert_eq!(held.releases.load(Ordering::SeqCst), 1);
    assert_eq!(pool.cluster_stats(&info).unwrap().used, 0);

    assert!(matches!(
        pool.release_object(&held),
        Err(PoolError::ObjectNotFound { .. })
    ));
}

#[test]
fn panicking_release_does_not_stop_the_sweep() {
    let config = PoolConfiguration::new()
        .with_used_aging_time(Duration::from_millis(5))
        .without_sweeper();
    let (pool, _) = counting_pool(config);
    let flaky = ConnectionInfo::new("flaky", "lrm", "svc", "secret");
    let healthy = db("lrm");

    let first = pool.get_object(&flaky).unwrap();
    let second = pool.get_object(&flaky).unwrap();
    let other = pool.get_object(&healthy).unwrap();
    thread::sleep(Duration::from_millis(30));

    let report = pool.sweep();
    assert_eq!(report.used_reclaimed, 3);
    assert_eq!(report.release_failures, 2);
    assert_eq!(first.releases.load(Ordering::SeqCst), 1);
    assert_eq!(second.releases.load(Ordering::SeqCst), 1);
    assert_eq!(other.releases.load(Ordering::SeqCst), 1);
    assert_eq!(pool.cluster_stats(&flaky).unwrap().used, 0);
    assert_eq!(pool.cluster_stats(&healthy).unwrap().used, 0);

    let metrics = pool.metrics();
    assert_eq!(metrics.used_reclaimed, 3);
    assert_eq!(metrics.release_failures, 2);
}

#[test]
fn get_on_closed_pool_registers_no_cluster() {
    let (pool, created) = counting_pool(bounded(1));
    pool.shutdown();

    assert!(matches!(pool.get_object(&db("lrm")), Err(PoolError::Closed)));
    assert!(pool.health_status().clusters.is_empty());
    assert_eq!(created.load(Ordering::SeqCst), 0);
}

#[test]
fn disabled_used_aging_never_reclaims() {
    let config = bounded(2).with_free_aging_time(Duration::from_millis(1));
    let (pool, _) = counting_pool(config);
    let info = db("lrm");

    let held = pool.get_object(&info).unwrap();
    for _ in 0..5 {
        thread::sleep(Duration::from_millis(5));
        assert_eq!(pool.sweep().used_reclaimed, 0);
    }
    assert_eq!(held.releases.load(Ordering::SeqCst), 0);
    pool.release_object(&held).unwrap();
}

#[test]
fn reuse_resets_the_state_clock() {
    let config = bounded(1).with_used_aging_time(Duration::from_millis(80));
    let (pool, _) = counting_pool(config);
    let info = db("lrm");

    let conn = pool.get_object(&info).unwrap();
    pool.release_object(&conn).unwrap();
    thread::sleep(Duration::from_millis(100));

    // idle time does not count towards the used threshold
    let again = pool.get_object(&info).unwrap();
    assert_eq!(pool.sweep().used_reclaimed, 0);
    pool.release_object(&again).unwrap();
}
