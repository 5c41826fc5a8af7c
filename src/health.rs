//! Health check and monitoring utilities for the role system.

use crate::{core::RoleSystem, error::Result, seed::verify_catalog, storage::Storage};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health information for a component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub last_check: String, // ISO 8601 timestamp
    pub response_time_ms: u64,
}

/// Overall system health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String, // ISO 8601 timestamp
    pub components: Vec<ComponentHealth>,
    pub metrics_summary: HealthMetrics,
}

/// Key metrics for health reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthMetrics {
    pub total_permission_checks: u64,
    pub cache_hit_rate: f64,
    pub total_errors: u64,
    pub total_users: usize,
    pub total_roles: usize,
    pub total_permissions: usize,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// A storage read slower than this reports `Degraded`.
    pub storage_timeout: Duration,
    /// Whether a missing catalog permission makes the system `Unhealthy`
    /// rather than `Degraded`.
    pub require_catalog: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_millis(100),
            require_catalog: false,
        }
    }
}

struct Counts {
    users: usize,
    roles: usize,
    permissions: usize,
}

/// Health checker for the role system.
pub struct HealthChecker {
    config: HealthCheckConfig,
    start_time: Instant,
}

impl HealthChecker {
    /// Create a new health checker.
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Perform a comprehensive health check.
    pub fn check_health<S: Storage>(&self, system: &RoleSystem<S>) -> HealthReport {
        let (storage_health, counts) = self.check_storage_health(system);
        let components = vec![
            storage_health,
            self.check_cache_health(system),
            self.check_catalog_health(system),
        ];

        let status = Self::determine_overall_status(&components);

        let summary = system.metrics().summary();
        let metrics_summary = HealthMetrics {
            total_permission_checks: summary.permission_checks,
            cache_hit_rate: summary.cache_hit_ratio * 100.0,
            total_errors: summary.errors_by_kind.values().sum(),
            total_users: counts.as_ref().map_or(0, |c| c.users),
            total_roles: counts.as_ref().map_or(0, |c| c.roles),
            total_permissions: counts.as_ref().map_or(0, |c| c.permissions),
        };

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            components,
            metrics_summary,
        }
    }

    fn check_storage_health<S: Storage>(
        &self,
        system: &RoleSystem<S>,
    ) -> (ComponentHealth, Option<Counts>) {
        let start = Instant::now();

        let result: Result<Counts> = system.storage().read(|tables| {
            Ok(Counts {
                users: tables.user_count(),
                roles: tables.role_count(),
                permissions: tables.permission_count(),
            })
        });
        let elapsed = start.elapsed();

        let (status, message, counts) = match result {
            Ok(counts) if elapsed > self.config.storage_timeout => (
                HealthStatus::Degraded,
                Some(format!(
                    "Storage read took {elapsed:?}, over the {:?} limit",
                    self.config.storage_timeout
                )),
                Some(counts),
            ),
            Ok(counts) => (HealthStatus::Healthy, None, Some(counts)),
            Err(e) => (
                HealthStatus::Unhealthy,
                Some(format!("Storage error: {e}")),
                None,
            ),
        };

        (Self::component("storage", status, message, start), counts)
    }

    fn check_cache_health<S: Storage>(&self, system: &RoleSystem<S>) -> ComponentHealth {
        let start = Instant::now();
        let stats = system.cache().stats();

        let message = if stats.enabled {
            format!(
                "{} entries, generation {}",
                stats.total_entries(),
                stats.generation
            )
        } else {
            "Caching disabled".to_string()
        };

        Self::component("cache", HealthStatus::Healthy, Some(message), start)
    }

    fn check_catalog_health<S: Storage>(&self, system: &RoleSystem<S>) -> ComponentHealth {
        let start = Instant::now();

        let (status, message) = match verify_catalog(system) {
            Ok(()) => (HealthStatus::Healthy, None),
            Err(e) if e.is_not_found() => {
                let status = if self.config.require_catalog {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Degraded
                };
                (status, Some(format!("Catalog incomplete: {e}")))
            }
            Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
        };

        Self::component("catalog", status, message, start)
    }

    fn component(
        name: &str,
        status: HealthStatus,
        message: Option<String>,
        start: Instant,
    ) -> ComponentHealth {
        ComponentHealth {
            name: name.to_string(),
            status,
            message,
            last_check: chrono::Utc::now().to_rfc3339(),
            response_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn determine_overall_status(components: &[ComponentHealth]) -> HealthStatus {
        if components.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if components.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthCheckConfig::default())
    }
}

/// Health check extension for RoleSystem.
impl<S: Storage> RoleSystem<S> {
    /// Perform a health check on the role system.
    pub fn health_check(&self) -> HealthReport {
        HealthChecker::default().check_health(self)
    }

    /// Perform a health check with custom configuration.
    pub fn health_check_with_config(&self, config: HealthCheckConfig) -> HealthReport {
        HealthChecker::new(config).check_health(self)
    }

    /// Get a simple health status (useful for load balancer health checks).
    pub fn is_healthy(&self) -> bool {
        self.health_check().status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewUser, seed::seed_defaults};

    #[test]
    fn test_seeded_system_is_healthy() {
        let system = RoleSystem::new();
        seed_defaults(&system).unwrap();
        let user = system
            .create_user(NewUser::new("Ada", "ada@example.com", "hash").role("viewer"))
            .unwrap();

        system.authorize(user.id(), "view-product").unwrap();
        system.authorize(user.id(), "edit-product").unwrap();

        let health = system.health_check();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(health.components.len(), 3);
        assert_eq!(health.metrics_summary.total_permission_checks, 2);
        assert_eq!(health.metrics_summary.total_users, 1);
        assert_eq!(health.metrics_summary.total_roles, 3);
        assert!(system.is_healthy());
    }

    #[test]
    fn test_missing_catalog_degrades() {
        let system = RoleSystem::new();

        let health = system.health_check();
        assert_eq!(health.status, HealthStatus::Degraded);
        let catalog = health
            .components
            .iter()
            .find(|c| c.name == "catalog")
            .unwrap();
        assert!(catalog.message.as_ref().unwrap().contains("view-product"));

        let strict = system.health_check_with_config(HealthCheckConfig {
            require_catalog: true,
            ..HealthCheckConfig::default()
        });
        assert_eq!(strict.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_report_serializes() {
        let system = RoleSystem::new();
        let json = serde_json::to_value(system.health_check()).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["components"][0]["name"], "storage");
    }
}
