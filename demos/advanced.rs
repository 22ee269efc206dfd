//! Advanced examples: tuning from properties, aging sweeps and metrics export

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use keyed_pool::{
    ConnectionDescriptor, Pool, PoolConfiguration, Poolable, ResourceId, TuningParameters,
    key_hash,
};

/// Descriptor for a directory service bind.
#[derive(Debug, Clone)]
struct DirectoryBind {
    host: String,
    bind_dn: String,
}

impl ConnectionDescriptor for DirectoryBind {
    fn key(&self) -> String {
        key_hash([&self.host, &self.bind_dn])
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0} is unreachable")]
struct Unreachable(String);

struct DirectoryConnection {
    bind: DirectoryBind,
    id: ResourceId,
    open: AtomicBool,
}

impl Poolable for DirectoryConnection {
    type Descriptor = DirectoryBind;
    type Error = Unreachable;

    fn descriptor(&self) -> &DirectoryBind {
        &self.bind
    }

    fn unique_id(&self) -> ResourceId {
        self.id
    }

    fn acquire(&mut self) -> Result<(), Unreachable> {
        if self.bind.host.ends_with(".invalid") {
            return Err(Unreachable(self.bind.host.clone()));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), Unreachable> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn connect(bind: &DirectoryBind) -> DirectoryConnection {
    DirectoryConnection {
        bind: bind.clone(),
        id: ResourceId::next(),
        open: AtomicBool::new(false),
    }
}

fn main() {
    println!("=== keyed_pool - Advanced Examples ===\n");

    tuning_from_properties();
    aging_sweeps();
    acquisition_failure();
}

fn tuning_from_properties() {
    println!("1. Tuning from a property store:");
    let mut store = HashMap::new();
    store.insert("DirectoryConnection_MaxPoolSize".to_string(), "4".to_string());
    store.insert("DirectoryConnection_UsedAgingTime".to_string(), "600000".to_string());
    store.insert("DirectoryConnection_FreeAgingTime".to_string(), "not a number".to_string());

    let tuning = TuningParameters::resolve::<DirectoryConnection>(&store);
    println!("   {tuning:?}");

    let pool = Pool::<DirectoryConnection>::from_properties(&store, connect);
    println!("   max pool size: {:?}", pool.config().max_pool_size);
    println!("   free aging: {:?}\n", pool.config().aging.free_aging_time);
}

fn aging_sweeps() {
    println!("2. Aging sweeps:");
    let config = PoolConfiguration::new()
        .with_free_aging_time(Duration::from_millis(50))
        .with_used_aging_time(Duration::from_millis(100))
        .without_sweeper();
    let pool = Pool::<DirectoryConnection>::new(connect, config);
    let bind = DirectoryBind {
        host: "ldap.example.org".to_string(),
        bind_dn: "cn=svc,dc=example,dc=org".to_string(),
    };

    let held = pool.get_object(&bind).unwrap();
    let idle = pool.get_object(&bind).unwrap();
    pool.release_object(&idle).unwrap();

    thread::sleep(Duration::from_millis(150));
    let report = pool.sweep();
    println!("   {report:?}");
    println!("   held connection still open: {}", held.open.load(Ordering::SeqCst));
    println!("   late release: {:?}", pool.release_object(&held).err());

    let mut tags = HashMap::new();
    tags.insert("service".to_string(), "directory".to_string());
    println!("\n{}", pool.export_metrics_prometheus("directory", Some(&tags)));
}

fn acquisition_failure() {
    println!("3. Acquisition failure:");
    let pool = Pool::<DirectoryConnection>::new(connect, PoolConfiguration::new().without_sweeper());
    let bind = DirectoryBind {
        host: "ldap.invalid".to_string(),
        bind_dn: "cn=svc".to_string(),
    };
    if let Err(err) = pool.get_object(&bind) {
        println!("   {err}");
        if let Some(source) = std::error::Error::source(&err) {
            println!("   caused by: {source}");
        }
    }
}
