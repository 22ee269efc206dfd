//! Pool configuration options

use std::time::Duration;

use crate::descriptor::{BackoffGrowth, jitter};
use crate::eviction::AgingPolicy;
use crate::tuning::TuningParameters;

/// Attempts made by `get_object` before it gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff base in milliseconds when none is configured.
pub const DEFAULT_SLEEP_TIME_BASE_MS: u64 = 10;

/// Interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on a single retry sleep.
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_secs(5);

/// Bounded retry with jittered backoff used while a cluster is at capacity.
///
/// # Examples
///
/// ```
/// use keyed_pool::{BackoffGrowth, RetryPolicy};
///
/// let policy = RetryPolicy::default().with_growth(BackoffGrowth::Doubling);
/// assert_eq!(policy.max_attempts, 3);
///
/// let sleep = policy.sleep_for(2);
/// assert!(sleep.as_millis() >= 10 && sleep.as_millis() < 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total cluster attempts, including the first one
    pub max_attempts: u32,

    /// Backoff base in milliseconds
    pub sleep_time_base: u64,

    pub growth: BackoffGrowth,

    /// Cap applied to every drawn sleep
    pub max_sleep: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            sleep_time_base: DEFAULT_SLEEP_TIME_BASE_MS,
            growth: BackoffGrowth::Power,
            max_sleep: DEFAULT_MAX_SLEEP,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_sleep_time_base(mut self, base_ms: u64) -> Self {
        self.sleep_time_base = base_ms;
        self
    }

    pub fn with_growth(mut self, growth: BackoffGrowth) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Jittered sleep before retry number `attempt` (starting at 1).
    pub fn sleep_for(&self, attempt: u32) -> Duration {
        let ceiling = self.growth.ceiling(self.sleep_time_base, attempt);
        Duration::from_millis(jitter(ceiling)).min(self.max_sleep)
    }
}

/// Configuration for pool behavior
///
/// # Examples
///
/// ```
/// use keyed_pool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_pool_size(8)
///     .with_max_attempts(5)
///     .with_used_aging_time(Duration::from_secs(600))
///     .without_sweeper();
///
/// assert_eq!(config.max_pool_size, Some(8));
/// assert_eq!(config.retry.max_attempts, 5);
/// assert_eq!(config.sweep_interval, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Maximum objects (free + used) per connection key; `None` is unbounded
    pub max_pool_size: Option<usize>,

    pub retry: RetryPolicy,

    pub aging: AgingPolicy,

    /// Background sweep interval; `None` runs no sweeper thread
    pub sweep_interval: Option<Duration>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_pool_size: None,
            retry: RetryPolicy::default(),
            aging: AgingPolicy::disabled(),
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Map integer tuning parameters onto a configuration.
    ///
    /// Negative values leave the corresponding limit unbounded or disabled.
    /// A missing sleep base falls back to [`DEFAULT_SLEEP_TIME_BASE_MS`].
    pub fn from_tuning(tuning: &TuningParameters) -> Self {
        let mut config = Self::default();
        config.max_pool_size = usize::try_from(tuning.max_pool_size).ok();
        if let Ok(base) = u64::try_from(tuning.sleep_time) {
            config.retry.sleep_time_base = base;
        }
        config.aging = AgingPolicy::from_millis(tuning.used_aging_time, tuning.free_aging_time);
        config
    }

    /// Set the maximum objects per connection key
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.max_pool_size = None;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry = self.retry.with_max_attempts(attempts);
        self
    }

    /// Set the backoff base in milliseconds
    pub fn with_sleep_time_base(mut self, base_ms: u64) -> Self {
        self.retry.sleep_time_base = base_ms;
        self
    }

    pub fn with_aging(mut self, aging: AgingPolicy) -> Self {
        self.aging = aging;
        self
    }

    /// Reclaim checked-out objects held longer than `limit`.
    ///
    /// Set this well above the longest legitimate hold time: an object past
    /// the limit is released under the caller's feet.
    pub fn with_used_aging_time(mut self, limit: Duration) -> Self {
        self.aging.used_aging_time = Some(limit);
        self
    }

    pub fn with_free_aging_time(mut self, limit: Duration) -> Self {
        self.aging.free_aging_time = Some(limit);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Disable the background sweeper; sweeps then only run through `Pool::sweep`.
    pub fn without_sweeper(mut self) -> Self {
        self.sweep_interval = None;
        self
    }
}
