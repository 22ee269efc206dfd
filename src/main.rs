// keyed_pool demo binary
// Run the demos with: cargo run --example basic

use std::collections::HashMap;
use std::convert::Infallible;

use keyed_pool::{ConnectionInfo, Pool, Poolable, ResourceId};
use tracing_subscriber::EnvFilter;

struct DemoSession {
    info: ConnectionInfo,
    id: ResourceId,
}

impl Poolable for DemoSession {
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

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== keyed_pool ===");
    println!("See demos/ for usage examples");
    println!();

    let mut properties = HashMap::new();
    properties.insert("DemoSession_MaxPoolSize".to_string(), "2".to_string());
    properties.insert("DemoSession_SleepTime".to_string(), "10".to_string());

    let pool = Pool::<DemoSession>::from_properties(&properties, |info: &ConnectionInfo| DemoSession {
        info: info.clone(),
        id: ResourceId::next(),
    });

    let info = ConnectionInfo::new("db-01", "lrm", "svc", "secret");
    {
        let session = match pool.lease(&info) {
            Ok(session) => session,
            Err(err) => {
                eprintln!("  checkout failed: {err}");
                return;
            }
        };
        println!("  Got session {} for {}", session.unique_id(), session.descriptor());
    }

    let health = pool.health_status();
    println!("  Free after return: {}", health.free_objects);
}
