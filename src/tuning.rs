//! Per-resource-type tuning parameters read from a property store
//!
//! Each parameter is looked up as `"{TypeName}_{ParamName}"`. Any failure,
//! whether a missing key, a store error or a non-integer value, resolves to
//! [`SENTINEL`], which the pool reads as "unbounded" or "disabled". A typo in
//! the store therefore silently removes the corresponding limit.

use std::collections::HashMap;

use tracing::debug;

use crate::errors::BoxError;

/// Value used for any parameter that could not be resolved.
pub const SENTINEL: i64 = -1;

pub const MAX_POOL_SIZE: &str = "MaxPoolSize";
pub const SLEEP_TIME: &str = "SleepTime";
pub const USED_AGING_TIME: &str = "UsedAgingTime";
pub const FREE_AGING_TIME: &str = "FreeAgingTime";

/// Key/value lookup backing the tuning parameters.
pub trait PropertySource: Send + Sync {
    /// `Ok(None)` when the property is not defined.
    fn property_value(&self, name: &str) -> Result<Option<String>, BoxError>;
}

impl PropertySource for HashMap<String, String> {
    fn property_value(&self, name: &str) -> Result<Option<String>, BoxError> {
        Ok(self.get(name).cloned())
    }
}

/// Reads properties from environment variables, optionally prefixed.
#[derive(Debug, Clone, Default)]
pub struct EnvPropertySource {
    prefix: String,
}

impl EnvPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// `with_prefix("APP_")` resolves `SqlConnection_MaxPoolSize` from `APP_SqlConnection_MaxPoolSize`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl PropertySource for EnvPropertySource {
    fn property_value(&self, name: &str) -> Result<Option<String>, BoxError> {
        match std::env::var(format!("{}{}", self.prefix, name)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Adapts a closure into a [`PropertySource`].
pub struct FnPropertySource<F>(pub F);

impl<F> PropertySource for FnPropertySource<F>
where
    F: Fn(&str) -> Result<Option<String>, BoxError> + Send + Sync,
{
    fn property_value(&self, name: &str) -> Result<Option<String>, BoxError> {
        (self.0)(name)
    }
}

/// The four integers that tune a pool for one resource type.
///
/// # Examples
///
/// ```
/// use keyed_pool::{TuningParameters, SENTINEL};
/// use std::collections::HashMap;
///
/// let mut store = HashMap::new();
/// store.insert("SqlConnection_MaxPoolSize".to_string(), "16".to_string());
/// store.insert("SqlConnection_SleepTime".to_string(), "oops".to_string());
///
/// let tuning = TuningParameters::resolve_named(&store, "SqlConnection");
/// assert_eq!(tuning.max_pool_size, 16);
/// assert_eq!(tuning.sleep_time, SENTINEL);
/// assert_eq!(tuning.used_aging_time, SENTINEL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TuningParameters {
    pub max_pool_size: i64,
    /// Backoff base in milliseconds
    pub sleep_time: i64,
    pub used_aging_time: i64,
    pub free_aging_time: i64,
}

impl Default for TuningParameters {
    fn default() -> Self {
        Self {
            max_pool_size: SENTINEL,
            sleep_time: SENTINEL,
            used_aging_time: SENTINEL,
            free_aging_time: SENTINEL,
        }
    }
}

impl TuningParameters {
    /// Resolve the parameters for resource type `T`, keyed by its short type name.
    pub fn resolve<T: ?Sized>(source: &dyn PropertySource) -> Self {
        Self::resolve_named(source, short_type_name::<T>())
    }

    pub fn resolve_named(source: &dyn PropertySource, type_name: &str) -> Self {
        Self {
            max_pool_size: lookup(source, type_name, MAX_POOL_SIZE),
            sleep_time: lookup(source, type_name, SLEEP_TIME),
            used_aging_time: lookup(source, type_name, USED_AGING_TIME),
            free_aging_time: lookup(source, type_name, FREE_AGING_TIME),
        }
    }
}

/// Look up one `"{type_name}_{param}"` integer, falling back to [`SENTINEL`].
pub fn lookup(source: &dyn PropertySource, type_name: &str, param: &str) -> i64 {
    let name = format!("{type_name}_{param}");
    match source.property_value(&name) {
        Ok(Some(raw)) => match raw.trim().parse::<i64>() {
            Ok(value) => value,
            Err(err) => {
                debug!(property = %name, value = %raw, error = %err, "Tuning value is not an integer");
                SENTINEL
            }
        },
        Ok(None) => {
            debug!(property = %name, "Tuning property not set");
            SENTINEL
        }
        Err(err) => {
            debug!(property = %name, error = %err, "Tuning property lookup failed");
            SENTINEL
        }
    }
}

/// `my_crate::db::SqlConnection<Tls>` becomes `SqlConnection`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SqlConnection;

    mod nested {
        pub struct Wrapper<T>(pub T);
    }

    fn store(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn short_names_drop_paths_and_generics() {
        assert_eq!(short_type_name::<SqlConnection>(), "SqlConnection");
        assert_eq!(short_type_name::<nested::Wrapper<SqlConnection>>(), "Wrapper");
        assert_eq!(short_type_name::<u32>(), "u32");
    }

    #[test]
    fn resolves_all_four_keys() {
        let source = store(&[
            ("SqlConnection_MaxPoolSize", "5"),
            ("SqlConnection_SleepTime", " 20 "),
            ("SqlConnection_UsedAgingTime", "60000"),
            ("SqlConnection_FreeAgingTime", "30000"),
        ]);
        let tuning = TuningParameters::resolve::<SqlConnection>(&source);
        assert_eq!(
            tuning,
            TuningParameters {
                max_pool_size: 5,
                sleep_time: 20,
                used_aging_time: 60_000,
                free_aging_time: 30_000,
            }
        );
    }

    #[test]
    fn each_key_falls_back_independently() {
        let source = store(&[
            ("SqlConnection_MaxPoolSize", "5"),
            ("SqlConnection_UsedAgingTime", "12.5"),
            ("Other_SleepTime", "20"),
        ]);
        let tuning = TuningParameters::resolve::<SqlConnection>(&source);
        assert_eq!(tuning.max_pool_size, 5);
        assert_eq!(tuning.sleep_time, SENTINEL);
        assert_eq!(tuning.used_aging_time, SENTINEL);
        assert_eq!(tuning.free_aging_time, SENTINEL);
    }

    #[test]
    fn store_errors_become_sentinel() {
        let source = FnPropertySource(|name: &str| -> Result<Option<String>, BoxError> {
            if name.ends_with(MAX_POOL_SIZE) {
                Err("store unavailable".into())
            } else {
                Ok(Some("7".to_string()))
            }
        });
        let tuning = TuningParameters::resolve_named(&source, "Conn");
        assert_eq!(tuning.max_pool_size, SENTINEL);
        assert_eq!(tuning.sleep_time, 7);
    }

    #[test]
    fn env_source_uses_prefix() {
        let source = EnvPropertySource::with_prefix("KEYED_POOL_TUNING_TEST_");
        assert_eq!(source.property_value("Definitely_Missing").unwrap(), None);
    }
}
