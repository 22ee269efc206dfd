//! Basic usage examples for keyed_pool

use std::convert::Infallible;

use keyed_pool::{ConnectionInfo, Pool, PoolConfiguration, PoolError, Poolable, ResourceId};

struct Session {
    info: ConnectionInfo,
    id: ResourceId,
}

impl Poolable for Session {
    type Descriptor = ConnectionInfo;
    type Error = Infallible;

    fn descriptor(&self) -> &ConnectionInfo {
        &self.info
    }

    fn unique_id(&self) -> ResourceId {
        self.id
    }

    fn acquire(&mut self) -> Result<(), Infallible> {
        println!("   [acquire {} -> {}]", self.id, self.info);
        Ok(())
    }

    fn release(&self) -> Result<(), Infallible> {
        println!("   [release {}]", self.id);
        Ok(())
    }
}

fn session(info: &ConnectionInfo) -> Session {
    Session {
        info: info.clone(),
        id: ResourceId::next(),
    }
}

fn main() {
    println!("=== keyed_pool - Basic Examples ===\n");

    // Example 1: explicit checkout and release
    explicit_release();

    // Example 2: leases
    leases();

    // Example 3: capacity and retry exhaustion
    exhaustion();

    // Example 4: separate keys, separate clusters
    separate_keys();
}

fn explicit_release() {
    println!("1. Explicit release:");
    let pool = Pool::<Session>::new(session, PoolConfiguration::new().without_sweeper());
    let info = ConnectionInfo::new("db-01", "lrm", "svc", "secret");

    let first = pool.get_object(&info).unwrap();
    pool.release_object(&first).unwrap();
    let again = pool.get_object(&info).unwrap();
    println!("   Reused same session: {}\n", first.unique_id() == again.unique_id());
}

fn leases() {
    println!("2. Leases:");
    let pool = Pool::<Session>::new(session, PoolConfiguration::new().without_sweeper());
    let info = ConnectionInfo::new("db-01", "lrm", "svc", "secret");

    {
        let lease = pool.lease(&info).unwrap();
        println!("   Leased {}", lease.unique_id());
    }

    let stats = pool.cluster_stats(&info).unwrap();
    println!("   After drop - used: {}, free: {}\n", stats.used, stats.free);
}

fn exhaustion() {
    println!("3. Capacity:");
    let config = PoolConfiguration::new()
        .with_max_pool_size(1)
        .with_sleep_time_base(5)
        .without_sweeper();
    let pool = Pool::<Session>::new(session, config);
    let info = ConnectionInfo::new("db-01", "lrm", "svc", "secret");

    let _held = pool.get_object(&info).unwrap();
    match pool.get_object(&info) {
        Err(PoolError::CouldNotObtain { attempts, .. }) => {
            println!("   Gave up after {attempts} attempts\n");
        }
        other => println!("   Unexpected: {:?}\n", other.map(|s| s.unique_id())),
    }
}

fn separate_keys() {
    println!("4. Separate keys:");
    let pool = Pool::<Session>::new(
        session,
        PoolConfiguration::new().with_max_pool_size(1).without_sweeper(),
    );
    let lrm = ConnectionInfo::new("db-01", "lrm", "svc", "secret");
    let slk = ConnectionInfo::new("db-01", "slk", "svc", "secret");

    let _a = pool.get_object(&lrm).unwrap();
    let _b = pool.get_object(&slk).unwrap();

    let health = pool.health_status();
    println!("   Clusters: {}, used: {}", health.clusters.len(), health.used_objects);
    for warning in &health.warnings {
        println!("   warning: {warning}");
    }
}
