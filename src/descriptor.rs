//! Connection descriptors, key hashing and jittered backoff

use std::fmt;

use rand::Rng;
use sha2::{Digest, Sha256};

/// Identifies a class of interchangeable resources.
///
/// Clusters are partitioned by [`key`](ConnectionDescriptor::key), never by
/// identity: two descriptors with the same key share one cluster. The key
/// must be a pure function of the descriptor's (immutable) state.
pub trait ConnectionDescriptor: Clone + fmt::Debug + Send + Sync + 'static {
    fn key(&self) -> String;
}

/// Hash an ordered list of strings into a stable lowercase hex key.
///
/// The values are concatenated in order before hashing.
///
/// # Examples
///
/// ```
/// use keyed_pool::key_hash;
///
/// let a = key_hash(["db-01", "main", "svc"]);
/// let b = key_hash(["db-01", "main", "svc"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn key_hash<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(value.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Growth curve of the backoff ceiling across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffGrowth {
    /// `base^attempt`
    #[default]
    Power,
    /// `base * 2^(attempt - 1)`
    Doubling,
}

impl BackoffGrowth {
    /// Upper bound (exclusive) of the sleep for `attempt`, saturating on overflow.
    pub fn ceiling(self, base: u64, attempt: u32) -> u64 {
        match self {
            Self::Power => base.saturating_pow(attempt),
            Self::Doubling => {
                let shift = attempt.saturating_sub(1).min(63);
                base.saturating_mul(1u64 << shift)
            }
        }
    }
}

/// Jittered sleep in milliseconds, drawn from `[base^attempt / 2, base^attempt)`.
///
/// Attempts start at 1; with `attempt == 0` the range collapses to zero.
pub fn random_sleep(base: u64, attempt: u32) -> u64 {
    jitter(BackoffGrowth::Power.ceiling(base, attempt))
}

pub(crate) fn jitter(ceiling: u64) -> u64 {
    if ceiling <= 1 {
        return 0;
    }
    rand::rng().random_range(ceiling / 2..ceiling)
}

/// Descriptor for a database-style endpoint: server, database and credentials.
///
/// The key is computed once at construction; the password never appears in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    server: String,
    database: String,
    user: String,
    password: String,
    key: String,
}

impl ConnectionInfo {
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let server = server.into();
        let database = database.into();
        let user = user.into();
        let password = password.into();
        let key = key_hash([&server, &database, &user, &password]);
        Self {
            server,
            database,
            user,
            password,
            key,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.user, self.server, self.database)
    }
}

impl ConnectionDescriptor for ConnectionInfo {
    fn key(&self) -> String {
        self.key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hash_is_stable_and_order_sensitive() {
        let a = key_hash(["srv", "db"]);
        assert_eq!(a, key_hash(vec!["srv".to_string(), "db".to_string()]));
        assert_ne!(a, key_hash(["db", "srv"]));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn key_hash_of_known_input() {
        // sha256("abc")
        assert_eq!(
            key_hash(["a", "bc"]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn random_sleep_stays_in_range() {
        for attempt in 1..=3 {
            let ceiling = 10u64.pow(attempt);
            for _ in 0..200 {
                let sleep = random_sleep(10, attempt);
                assert!(sleep >= ceiling / 2 && sleep < ceiling, "{sleep} for attempt {attempt}");
            }
        }
    }

    #[test]
    fn zero_attempt_collapses() {
        assert_eq!(random_sleep(10, 0), 0);
        assert_eq!(random_sleep(0, 3), 0);
    }

    #[test]
    fn growth_curves() {
        assert_eq!(BackoffGrowth::Power.ceiling(10, 3), 1000);
        assert_eq!(BackoffGrowth::Doubling.ceiling(10, 1), 10);
        assert_eq!(BackoffGrowth::Doubling.ceiling(10, 3), 40);
        assert_eq!(BackoffGrowth::Power.ceiling(u64::MAX, 2), u64::MAX);
        assert_eq!(BackoffGrowth::Doubling.ceiling(u64::MAX, 70), u64::MAX);
    }

    #[test]
    fn connection_info_key_follows_fields() {
        let a = ConnectionInfo::new("db-01", "main", "svc", "secret");
        let b = ConnectionInfo::new("db-01", "main", "svc", "secret");
        let c = ConnectionInfo::new("db-02", "main", "svc", "secret");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert!(!format!("{a:?}").contains("secret"));
        assert_eq!(a.to_string(), "svc@db-01/main");
    }
}
