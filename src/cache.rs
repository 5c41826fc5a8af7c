//! Process-wide memo of the permission graph.
//!
//! The cache stores graph data, never decisions: `user -> role ids`,
//! `role -> permission names` and `user -> direct permission names`. The
//! evaluator composes them on every check. Entries are filled lazily and the
//! whole cache is flushed whenever the graph changes.
//!
//! # Coherency
//!
//! `RoleSystem` consults the cache only inside a storage read and flushes it
//! only inside a storage transaction. Storage backends never let the two
//! overlap, so a reader cannot observe a half-cleared cache or repopulate it
//! with data from before a committed mutation.

use crate::{metrics::RoleSystemMetrics, role::RoleId, user::UserId};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "audit")]
use log::debug;

/// Shared cache of role and permission memberships.
#[derive(Debug)]
pub struct PermissionCache {
    enabled: bool,
    user_roles: DashMap<UserId, Arc<BTreeSet<RoleId>>>,
    role_permissions: DashMap<RoleId, Arc<BTreeSet<String>>>,
    direct_permissions: DashMap<UserId, Arc<BTreeSet<String>>>,
    generation: AtomicU64,
    metrics: Arc<RoleSystemMetrics>,
}

impl PermissionCache {
    /// Create an enabled cache.
    pub fn new(metrics: Arc<RoleSystemMetrics>) -> Self {
        Self::with_enabled(metrics, true)
    }

    /// Create a cache that always recomputes. Outcomes are identical.
    pub fn disabled(metrics: Arc<RoleSystemMetrics>) -> Self {
        Self::with_enabled(metrics, false)
    }

    fn with_enabled(metrics: Arc<RoleSystemMetrics>, enabled: bool) -> Self {
        Self {
            enabled,
            user_roles: DashMap::new(),
            role_permissions: DashMap::new(),
            direct_permissions: DashMap::new(),
            generation: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn metrics(&self) -> &Arc<RoleSystemMetrics> {
        &self.metrics
    }

    /// Role ids held by `user`, loading them on a miss.
    pub fn user_roles<F>(&self, user: UserId, load: F) -> Arc<BTreeSet<RoleId>>
    where
        F: FnOnce() -> BTreeSet<RoleId>,
    {
        self.get_or_load(&self.user_roles, user, load)
    }

    /// Permission names granted by `role`, loading them on a miss.
    pub fn role_permissions<F>(&self, role: RoleId, load: F) -> Arc<BTreeSet<String>>
    where
        F: FnOnce() -> BTreeSet<String>,
    {
        self.get_or_load(&self.role_permissions, role, load)
    }

    /// Permission names granted to `user` directly, loading them on a miss.
    pub fn direct_permissions<F>(&self, user: UserId, load: F) -> Arc<BTreeSet<String>>
    where
        F: FnOnce() -> BTreeSet<String>,
    {
        self.get_or_load(&self.direct_permissions, user, load)
    }

    /// Drop every entry.
    pub fn flush(&self) {
        if !self.enabled {
            return;
        }

        self.user_roles.clear();
        self.role_permissions.clear();
        self.direct_permissions.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.metrics.record_cache_flush();

        #[cfg(feature = "audit")]
        debug!("Permission cache flushed (generation {})", self.generation());
    }

    /// Number of flushes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.enabled,
            user_role_entries: self.user_roles.len(),
            role_permission_entries: self.role_permissions.len(),
            direct_permission_entries: self.direct_permissions.len(),
            generation: self.generation(),
        }
    }

    fn get_or_load<K, V, F>(&self, map: &DashMap<K, Arc<V>>, key: K, load: F) -> Arc<V>
    where
        K: Eq + Hash,
        F: FnOnce() -> V,
    {
        if !self.enabled {
            return Arc::new(load());
        }

        if let Some(entry) = map.get(&key) {
            self.metrics.record_cache_hit();
            return Arc::clone(entry.value());
        }

        self.metrics.record_cache_miss();
        let value = Arc::new(load());
        map.insert(key, Arc::clone(&value));
        value
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub user_role_entries: usize,
    pub role_permission_entries: usize,
    pub direct_permission_entries: usize,
    pub generation: u64,
}

impl CacheStats {
    /// Total entries across the three maps.
    pub fn total_entries(&self) -> usize {
        self.user_role_entries + self.role_permission_entries + self.direct_permission_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_lazy_population_and_hits() {
        let metrics = Arc::new(RoleSystemMetrics::new());
        let cache = PermissionCache::new(metrics.clone());
        let loads = Cell::new(0);

        for _ in 0..3 {
            let roles = cache.user_roles(UserId(1), || {
                loads.set(loads.get() + 1);
                BTreeSet::from([RoleId(7)])
            });
            assert!(roles.contains(&RoleId(7)));
        }

        assert_eq!(loads.get(), 1);
        assert_eq!(metrics.cache_misses.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.cache_hits.load(Ordering::Relaxed), 2);
        assert_eq!(cache.stats().user_role_entries, 1);
    }

    #[test]
    fn test_flush_clears_everything() {
        let cache = PermissionCache::new(Arc::new(RoleSystemMetrics::new()));

        cache.user_roles(UserId(1), || BTreeSet::from([RoleId(1)]));
        cache.role_permissions(RoleId(1), || BTreeSet::from(["view-product".to_string()]));
        cache.direct_permissions(UserId(1), BTreeSet::new);
        assert_eq!(cache.stats().total_entries(), 3);

        cache.flush();

        let stats = cache.stats();
        assert_eq!(stats.total_entries(), 0);
        assert_eq!(stats.generation, 1);

        let reloaded = cache.role_permissions(RoleId(1), || BTreeSet::from(["edit-product".to_string()]));
        assert!(reloaded.contains("edit-product"));
    }

    #[test]
    fn test_disabled_cache_always_loads() {
        let metrics = Arc::new(RoleSystemMetrics::new());
        let cache = PermissionCache::disabled(metrics.clone());
        let loads = Cell::new(0);

        for _ in 0..2 {
            cache.direct_permissions(UserId(1), || {
                loads.set(loads.get() + 1);
                BTreeSet::new()
            });
        }

        assert_eq!(loads.get(), 2);
        assert_eq!(cache.stats().total_entries(), 0);
        assert_eq!(metrics.cache_hits.load(Ordering::Relaxed), 0);
        cache.flush();
        assert_eq!(cache.generation(), 0);
    }
}
