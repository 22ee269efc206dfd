//! Async usage examples for keyed_pool

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use keyed_pool::{ConnectionInfo, Pool, PoolConfiguration, Poolable, ResourceId};

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
        Ok(())
    }

    fn release(&self) -> Result<(), Infallible> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    println!("=== keyed_pool - Async Examples ===\n");

    let config = PoolConfiguration::new()
        .with_max_pool_size(3)
        .with_max_attempts(6)
        .with_sleep_time_base(4);
    let pool = Arc::new(Pool::<Session>::new(
        |info: &ConnectionInfo| Session {
            info: info.clone(),
            id: ResourceId::next(),
        },
        config,
    ));
    let info = ConnectionInfo::new("db-01", "lrm", "svc", "secret");

    println!("1. Concurrent tasks sharing three sessions:");
    let mut handles = Vec::new();
    for task in 0..8 {
        let pool = Arc::clone(&pool);
        let info = info.clone();
        handles.push(tokio::spawn(async move {
            match pool.lease_async(&info).await {
                Ok(session) => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    println!("   task {task} used {}", session.unique_id());
                }
                Err(err) => println!("   task {task} failed: {err}"),
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    let metrics = pool.metrics();
    println!(
        "\n   created: {}, retrieved: {}, exhausted attempts: {}",
        metrics.total_created, metrics.total_retrieved, metrics.exhausted_attempts
    );
}
