//! Metrics collection for the access control core.

use crate::error::ErrorKind;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for rbac operations.
#[derive(Debug, Clone, Default)]
pub struct RoleSystemMetrics {
    /// Number of authorization checks performed.
    pub permission_checks: Arc<AtomicU64>,
    /// Checks that were granted.
    pub permission_grants: Arc<AtomicU64>,
    /// Checks that were denied.
    pub permission_denials: Arc<AtomicU64>,
    /// Number of cache hits.
    pub cache_hits: Arc<AtomicU64>,
    /// Number of cache misses.
    pub cache_misses: Arc<AtomicU64>,
    /// Number of whole-cache flushes.
    pub cache_flushes: Arc<AtomicU64>,
    /// Committed graph mutations.
    pub graph_mutations: Arc<AtomicU64>,
    /// Error counts by kind.
    pub error_counts: Arc<DashMap<ErrorKind, AtomicU64>>,
}

impl RoleSystemMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of an authorization check.
    pub fn record_permission_check(&self, granted: bool) {
        self.permission_checks.fetch_add(1, Ordering::Relaxed);
        if granted {
            self.permission_grants.fetch_add(1, Ordering::Relaxed);
        } else {
            self.permission_denials.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache flush.
    pub fn record_cache_flush(&self) {
        self.cache_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed graph mutation.
    pub fn record_mutation(&self) {
        self.graph_mutations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error.
    pub fn record_error(&self, kind: ErrorKind) {
        self.error_counts
            .entry(kind)
            .and_modify(|count| {
                count.fetch_add(1, Ordering::Relaxed);
            })
            .or_insert_with(|| AtomicU64::new(1));
    }

    /// Get cache hit ratio.
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Number of errors recorded for `kind`.
    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.error_counts
            .get(&kind)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Get a snapshot of current metrics.
    pub fn summary(&self) -> MetricsSummary {
        let errors_by_kind = self
            .error_counts
            .iter()
            .map(|entry| (entry.key().as_str(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSummary {
            permission_checks: self.permission_checks.load(Ordering::Relaxed),
            permission_grants: self.permission_grants.load(Ordering::Relaxed),
            permission_denials: self.permission_denials.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_flushes: self.cache_flushes.load(Ordering::Relaxed),
            cache_hit_ratio: self.cache_hit_ratio(),
            graph_mutations: self.graph_mutations.load(Ordering::Relaxed),
            errors_by_kind,
        }
    }
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub permission_checks: u64,
    pub permission_grants: u64,
    pub permission_denials: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_flushes: u64,
    pub cache_hit_ratio: f64,
    pub graph_mutations: u64,
    pub errors_by_kind: std::collections::BTreeMap<&'static str, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_basic_operations() {
        let metrics = RoleSystemMetrics::new();

        metrics.record_permission_check(true);
        metrics.record_permission_check(false);
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_flush();
        metrics.record_mutation();

        let summary = metrics.summary();
        assert_eq!(summary.permission_checks, 2);
        assert_eq!(summary.permission_grants, 1);
        assert_eq!(summary.permission_denials, 1);
        assert_eq!(summary.cache_flushes, 1);
        assert_eq!(summary.graph_mutations, 1);
        assert!((summary.cache_hit_ratio - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_counting() {
        let metrics = RoleSystemMetrics::new();

        metrics.record_error(ErrorKind::NotFound);
        metrics.record_error(ErrorKind::NotFound);
        metrics.record_error(ErrorKind::Forbidden);

        assert_eq!(metrics.error_count(ErrorKind::NotFound), 2);
        assert_eq!(metrics.error_count(ErrorKind::Forbidden), 1);
        assert_eq!(metrics.error_count(ErrorKind::InternalError), 0);
        assert_eq!(metrics.summary().errors_by_kind["not_found"], 2);
    }

    #[test]
    fn test_empty_hit_ratio() {
        assert_eq!(RoleSystemMetrics::new().cache_hit_ratio(), 0.0);
    }
}
