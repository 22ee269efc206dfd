//! Health monitoring for keyed pools

use std::time::Duration;

/// Point-in-time view of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ClusterStats {
    /// Connection key of the cluster
    pub key: String,

    /// Objects idle in the free list
    pub free: usize,

    /// Objects checked out
    pub used: usize,

    /// Capacity bound; `None` is unbounded
    pub max_objects: Option<usize>,

    /// Age of the oldest tracked object
    pub oldest_object_age: Option<Duration>,

    /// Longest current checkout
    pub longest_hold: Option<Duration>,

    /// Longest time any free object has been idle
    pub longest_idle: Option<Duration>,
}

impl ClusterStats {
    pub fn total(&self) -> usize {
        self.free + self.used
    }

    /// Share of the capacity bound currently checked out (0.0 to 1.0).
    pub fn utilization(&self) -> f64 {
        match self.max_objects {
            Some(max) if max > 0 => self.used as f64 / max as f64,
            _ => 0.0,
        }
    }

    pub fn is_at_capacity(&self) -> bool {
        self.max_objects.is_some_and(|max| self.total() >= max)
    }
}

/// Health status of a keyed pool
///
/// # Examples
///
/// ```
/// use keyed_pool::HealthStatus;
///
/// let health = HealthStatus::new(Vec::new());
/// assert!(health.is_healthy());
/// assert_eq!(health.used_objects, 0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Highest utilization among bounded clusters (0.0 to 1.0)
    pub utilization: f64,

    /// Free objects across all clusters
    pub free_objects: usize,

    /// Used objects across all clusters
    pub used_objects: usize,

    /// Per-cluster detail
    pub clusters: Vec<ClusterStats>,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Build a status from per-cluster snapshots
    pub fn new(clusters: Vec<ClusterStats>) -> Self {
        let mut warnings = Vec::new();
        let mut is_healthy = true;
        let mut utilization: f64 = 0.0;

        for cluster in &clusters {
            let cluster_utilization = cluster.utilization();
            utilization = utilization.max(cluster_utilization);

            // Check for high utilization
            if cluster_utilization > 0.9 {
                warnings.push(format!(
                    "High utilization on {}: {:.1}%",
                    cluster.key,
                    cluster_utilization * 100.0
                ));
                is_healthy = false;
            }

            // Check if cluster is full
            if cluster.is_at_capacity() && cluster.free == 0 {
                warnings.push(format!("Cluster {} is at capacity", cluster.key));
            }
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            free_objects: clusters.iter().map(|c| c.free).sum(),
            used_objects: clusters.iter().map(|c| c.used).sum(),
            clusters,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(key: &str, free: usize, used: usize, max: Option<usize>) -> ClusterStats {
        ClusterStats {
            key: key.to_string(),
            free,
            used,
            max_objects: max,
            oldest_object_age: None,
            longest_hold: None,
            longest_idle: None,
        }
    }

    #[test]
    fn full_cluster_is_unhealthy() {
        let health = HealthStatus::new(vec![stats("a", 0, 2, Some(2)), stats("b", 3, 1, None)]);
        assert!(!health.is_healthy());
        assert_eq!(health.warning_count, 2);
        assert_eq!(health.used_objects, 3);
        assert_eq!(health.free_objects, 3);
        assert!((health.utilization - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unbounded_clusters_report_no_utilization() {
        let health = HealthStatus::new(vec![stats("a", 0, 50, None)]);
        assert!(health.is_healthy());
        assert_eq!(health.utilization, 0.0);
    }
}
