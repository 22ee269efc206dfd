//! The contract a resource must satisfy to be managed by a [`Pool`](crate::Pool)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::descriptor::ConnectionDescriptor;

/// Stable identity of one resource instance, independent of its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl ResourceId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An expensive, connection-like resource that can be pooled.
///
/// Lifecycle: the pool's factory builds the instance from a descriptor,
/// [`acquire`](Poolable::acquire) is called exactly once before it is handed
/// out, and [`release`](Poolable::release) is called at most once when the
/// pool discards it. An instance is never moved to another descriptor.
///
/// `release` may run on the sweeper thread while a caller still holds the
/// resource, if the caller kept it longer than the used aging time.
pub trait Poolable: Send + Sync + 'static {
    type Descriptor: ConnectionDescriptor;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Descriptor this instance was built for.
    fn descriptor(&self) -> &Self::Descriptor;

    fn unique_id(&self) -> ResourceId;

    /// Perform the setup that makes the instance usable. May fail.
    fn acquire(&mut self) -> Result<(), Self::Error>;

    /// Tear the instance down.
    fn release(&self) -> Result<(), Self::Error>;
}
