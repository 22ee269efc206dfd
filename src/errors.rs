//! Error types for the keyed pool

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::poolable::ResourceId;

/// Boxed error used at the property-store and resource boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("could not obtain connection for {key} after {attempts} attempts")]
    CouldNotObtain { key: String, attempts: u32 },

    #[error("could not acquire resource for {descriptor}")]
    Acquire {
        descriptor: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    #[error("object not found in pool for key {key}")]
    ObjectNotFound { key: String },

    #[error("resource {id} is already tracked for key {key}")]
    DuplicateIdentity { key: String, id: ResourceId },

    #[error("pool has been shut down")]
    Closed,
}

impl PoolError {
    pub(crate) fn acquire<E>(descriptor: String, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Acquire {
            descriptor,
            source: Arc::new(source),
        }
    }

    /// Whether this error reports a transient shortage rather than a broken resource.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::CouldNotObtain { .. })
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
