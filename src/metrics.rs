//! Metrics collection and export for keyed pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cluster::SweepReport;

/// Metrics data for a pool
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total objects handed out (reused or created)
    pub total_retrieved: usize,

    /// Total objects handed back through `release_object`
    pub total_released: usize,

    /// Total objects built and acquired
    pub total_created: usize,

    /// `acquire()` failures
    pub acquire_failures: usize,

    /// Cluster attempts that found no free slot
    pub exhausted_attempts: usize,

    /// `get_object` calls that ran out of attempts
    pub retries_exhausted: usize,

    /// Free objects removed by sweeps
    pub free_evicted: usize,

    /// Used objects force-released by sweeps
    pub used_reclaimed: usize,

    /// Failed `release()` calls during sweeps and shutdown
    pub release_failures: usize,

    /// Registered clusters
    pub clusters: usize,

    /// Current used objects
    pub used_objects: usize,

    /// Current free objects
    pub free_objects: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_retrieved".to_string(), self.total_retrieved.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("acquire_failures".to_string(), self.acquire_failures.to_string());
        metrics.insert("exhausted_attempts".to_string(), self.exhausted_attempts.to_string());
        metrics.insert("retries_exhausted".to_string(), self.retries_exhausted.to_string());
        metrics.insert("free_evicted".to_string(), self.free_evicted.to_string());
        metrics.insert("used_reclaimed".to_string(), self.used_reclaimed.to_string());
        metrics.insert("release_failures".to_string(), self.release_failures.to_string());
        metrics.insert("clusters".to_string(), self.clusters.to_string());
        metrics.insert("used_objects".to_string(), self.used_objects.to_string());
        metrics.insert("free_objects".to_string(), self.free_objects.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use keyed_pool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "lrm".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&PoolMetrics::default(), "sql", Some(&tags));
    /// assert!(output.contains("keyed_pool_objects_used"));
    /// assert!(output.contains("service=\"lrm\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        // Gauge metrics
        Self::push(&mut output, "keyed_pool_objects_used", "gauge", "Current used objects", &labels, metrics.used_objects);
        Self::push(&mut output, "keyed_pool_objects_free", "gauge", "Current free objects", &labels, metrics.free_objects);
        Self::push(&mut output, "keyed_pool_clusters", "gauge", "Registered clusters", &labels, metrics.clusters);

        // Counter metrics
        Self::push(&mut output, "keyed_pool_objects_retrieved_total", "counter", "Total objects retrieved", &labels, metrics.total_retrieved);
        Self::push(&mut output, "keyed_pool_objects_released_total", "counter", "Total objects released", &labels, metrics.total_released);
        Self::push(&mut output, "keyed_pool_objects_created_total", "counter", "Total objects created", &labels, metrics.total_created);
        Self::push(&mut output, "keyed_pool_acquire_failures_total", "counter", "Resource acquisition failures", &labels, metrics.acquire_failures);
        Self::push(&mut output, "keyed_pool_exhausted_attempts_total", "counter", "Attempts that found the cluster full", &labels, metrics.exhausted_attempts);
        Self::push(&mut output, "keyed_pool_retries_exhausted_total", "counter", "Checkouts that ran out of attempts", &labels, metrics.retries_exhausted);
        Self::push(&mut output, "keyed_pool_free_evicted_total", "counter", "Idle objects evicted by sweeps", &labels, metrics.free_evicted);
        Self::push(&mut output, "keyed_pool_used_reclaimed_total", "counter", "Over-held objects reclaimed by sweeps", &labels, metrics.used_reclaimed);
        Self::push(&mut output, "keyed_pool_release_failures_total", "counter", "Failed releases", &labels, metrics.release_failures);

        output
    }

    fn push(output: &mut String, name: &str, kind: &str, help: &str, labels: &str, value: usize) {
        output.push_str(&format!("# HELP {name} {help}\n"));
        output.push_str(&format!("# TYPE {name} {kind}\n"));
        output.push_str(&format!("{name}{{{labels}}} {value}\n"));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_retrieved: AtomicUsize,
    pub total_released: AtomicUsize,
    pub total_created: AtomicUsize,
    pub acquire_failures: AtomicUsize,
    pub exhausted_attempts: AtomicUsize,
    pub retries_exhausted: AtomicUsize,
    pub free_evicted: AtomicUsize,
    pub used_reclaimed: AtomicUsize,
    pub release_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sweep(&self, report: &SweepReport) {
        self.free_evicted.fetch_add(report.free_evicted, Ordering::Relaxed);
        self.used_reclaimed.fetch_add(report.used_reclaimed, Ordering::Relaxed);
        self.release_failures.fetch_add(report.release_failures, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, clusters: usize, used: usize, free: usize) -> PoolMetrics {
        PoolMetrics {
            total_retrieved: self.total_retrieved.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            acquire_failures: self.acquire_failures.load(Ordering::Relaxed),
            exhausted_attempts: self.exhausted_attempts.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            free_evicted: self.free_evicted.load(Ordering::Relaxed),
            used_reclaimed: self.used_reclaimed.load(Ordering::Relaxed),
            release_failures: self.release_failures.load(Ordering::Relaxed),
            clusters,
            used_objects: used,
            free_objects: free,
        }
    }
}
