//! # keyed_pool
//!
//! Thread-safe pool for expensive, connection-like resources, partitioned by
//! connection key.
//!
//! ## Features
//!
//! - One cluster per connection key, each with its own capacity bound and lock
//! - Blocking and async checkout with a bounded, jittered retry budget
//! - Background sweeper that evicts idle objects and reclaims over-held ones
//! - Tuning from any key/value property store, with permissive fallbacks
//! - RAII leases that hand objects back on drop
//! - Health snapshots and Prometheus metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use keyed_pool::{ConnectionInfo, Pool, PoolConfiguration, Poolable, ResourceId};
//! use std::convert::Infallible;
//!
//! struct Session {
//!     info: ConnectionInfo,
//!     id: ResourceId,
//! }
//!
//! impl Poolable for Session {
//!     type Descriptor = ConnectionInfo;
//!     type Error = Infallible;
//!
//!     fn descriptor(&self) -> &ConnectionInfo { &self.info }
//!     fn unique_id(&self) -> ResourceId { self.id }
//!     fn acquire(&mut self) -> Result<(), Infallible> { Ok(()) }
//!     fn release(&self) -> Result<(), Infallible> { Ok(()) }
//! }
//!
//! let pool = Pool::<Session>::new(
//!     |info: &ConnectionInfo| Session { info: info.clone(), id: ResourceId::next() },
//!     PoolConfiguration::new().with_max_pool_size(4),
//! );
//!
//! let info = ConnectionInfo::new("db-01", "lrm", "svc", "secret");
//! let session = pool.get_object(&info).unwrap();
//! pool.release_object(&session).unwrap();
//! ```

mod cluster;
mod config;
mod descriptor;
mod entry;
mod errors;
mod eviction;
mod health;
mod metrics;
mod pool;
mod poolable;
mod tuning;

pub use cluster::{Checkout, Cluster, Factory, SweepReport};
pub use config::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_SLEEP, DEFAULT_SLEEP_TIME_BASE_MS, DEFAULT_SWEEP_INTERVAL,
    PoolConfiguration, RetryPolicy,
};
pub use descriptor::{BackoffGrowth, ConnectionDescriptor, ConnectionInfo, key_hash, random_sleep};
pub use entry::ObjectState;
pub use errors::{BoxError, PoolError, PoolResult};
pub use eviction::AgingPolicy;
pub use health::{ClusterStats, HealthStatus};
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{Pool, PooledObject};
pub use poolable::{Poolable, ResourceId};
pub use tuning::{
    EnvPropertySource, FnPropertySource, PropertySource, SENTINEL, TuningParameters,
    short_type_name,
};
