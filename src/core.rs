//! Core role system implementation.
//!
//! This module contains the central `RoleSystem` struct which owns the
//! permission registry, the role store and the authorization evaluator.
//! User assignment operations live in [`crate::assignment`].
//!
//! # Architecture
//!
//! - **Permissions**: named capabilities, unique per guard
//! - **Roles**: named sets of permissions, unique per guard
//! - **Users**: hold roles and, optionally, direct permissions
//! - **Storage**: backend holding entities and edge sets, mutated in transactions
//! - **Cache**: memoized graph data, flushed on every committed mutation
//!
//! # Thread Safety
//!
//! Every operation takes `&self`. Reads go through `Storage::read`, mutations
//! through `Storage::transaction`, so a concurrent reader sees a cascade either
//! fully applied or not at all.

#[cfg(feature = "audit")]
use log::{info, warn};

use crate::{
    cache::PermissionCache,
    error::{Error, Result},
    metrics::RoleSystemMetrics,
    permission::{Guard, Permission, PermissionId, validate_name},
    role::{Role, RoleId, RoleUpdate, SUPER_ADMIN_ROLE},
    storage::{MemoryStorage, Storage, Tables},
    user::UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResult {
    /// Access is granted.
    Granted,
    /// Access is denied with a reason.
    Denied(String),
}

impl AccessResult {
    /// Returns true if access was granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessResult::Granted)
    }

    /// Returns true if access was denied.
    pub fn is_denied(&self) -> bool {
        !self.is_granted()
    }

    /// Returns the denial reason if access was denied.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            AccessResult::Denied(reason) => Some(reason),
            AccessResult::Granted => None,
        }
    }
}

impl From<bool> for AccessResult {
    fn from(granted: bool) -> Self {
        if granted {
            AccessResult::Granted
        } else {
            AccessResult::Denied("Access denied".to_string())
        }
    }
}

/// How holders of the `super-admin` role are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuperAdminPolicy {
    /// `super-admin` is an ordinary role that is granted every permission of
    /// its guard when the role is created and whenever a permission is created
    /// afterwards. The evaluator applies no special case.
    #[default]
    GrantOnCreate,
    /// Holders of `super-admin` pass every check without consulting the
    /// role's permission set.
    Bypass,
}

/// Configuration for the role system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleSystemConfig {
    /// Guard users are evaluated in. Role and permission names given for a
    /// user resolve in this guard.
    pub guard: Guard,
    /// Whether to memoize graph lookups.
    pub enable_caching: bool,
    /// Whether to emit audit log records (requires the `audit` feature).
    pub enable_audit: bool,
    /// Treatment of the `super-admin` role.
    pub super_admin_policy: SuperAdminPolicy,
}

impl Default for RoleSystemConfig {
    fn default() -> Self {
        Self {
            guard: Guard::default(),
            enable_caching: true,
            enable_audit: true,
            super_admin_policy: SuperAdminPolicy::default(),
        }
    }
}

impl RoleSystemConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        validate_name("guard", config.guard.as_str())
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        Ok(config)
    }
}

/// Builder for role system configurations.
///
/// # Example
/// ```rust
/// use rbac_gate::core::{RoleSystemConfigBuilder, SuperAdminPolicy};
///
/// let config = RoleSystemConfigBuilder::new()
///     .guard("web")
///     .enable_caching(false)
///     .super_admin_policy(SuperAdminPolicy::Bypass)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.guard.as_str(), "web");
/// ```
#[derive(Debug, Default)]
pub struct RoleSystemConfigBuilder {
    config: RoleSystemConfig,
    guard: Option<String>,
}

impl RoleSystemConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the guard users are evaluated in.
    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Enable or disable the permission cache.
    pub fn enable_caching(mut self, enable: bool) -> Self {
        self.config.enable_caching = enable;
        self
    }

    /// Enable or disable audit logging.
    pub fn enable_audit(mut self, enable: bool) -> Self {
        self.config.enable_audit = enable;
        self
    }

    /// Choose the `super-admin` treatment.
    pub fn super_admin_policy(mut self, policy: SuperAdminPolicy) -> Self {
        self.config.super_admin_policy = policy;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<RoleSystemConfig> {
        let mut config = self.config;
        if let Some(guard) = self.guard {
            config.guard =
                Guard::new(guard).map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        }
        Ok(config)
    }
}

/// A permission, optionally joined with the roles referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionEntry {
    #[serde(flatten)]
    pub permission: Permission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
}

/// A role with the names of its permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleEntry {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: BTreeSet<String>,
}

impl RoleEntry {
    fn load(tables: &Tables, id: RoleId) -> Result<Self> {
        Ok(Self {
            role: tables.role(id)?.clone(),
            permissions: tables.role_permission_names(id),
        })
    }
}

/// The main role-based access control system.
pub struct RoleSystem<S = MemoryStorage>
where
    S: Storage,
{
    storage: S,
    config: RoleSystemConfig,
    cache: Arc<PermissionCache>,
    metrics: Arc<RoleSystemMetrics>,
}

impl RoleSystem<MemoryStorage> {
    /// Create a new role system with default configuration and memory storage.
    pub fn new() -> Self {
        Self::with_config(RoleSystemConfig::default())
    }

    /// Create a new role system with custom configuration and memory storage.
    pub fn with_config(config: RoleSystemConfig) -> Self {
        Self::with_storage(MemoryStorage::new(), config)
    }
}

impl Default for RoleSystem<MemoryStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> RoleSystem<S>
where
    S: Storage,
{
    /// Create a new role system with custom storage.
    pub fn with_storage(storage: S, config: RoleSystemConfig) -> Self {
        let metrics = Arc::new(RoleSystemMetrics::new());
        let cache = if config.enable_caching {
            PermissionCache::new(metrics.clone())
        } else {
            PermissionCache::disabled(metrics.clone())
        };
        Self::with_cache(storage, config, Arc::new(cache))
    }

    /// Create a role system around an existing cache.
    ///
    /// The cache must not be shared with a system backed by different storage.
    pub fn with_cache(storage: S, config: RoleSystemConfig, cache: Arc<PermissionCache>) -> Self {
        Self {
            storage,
            config,
            metrics: cache.metrics().clone(),
            cache,
        }
    }

    pub fn config(&self) -> &RoleSystemConfig {
        &self.config
    }

    /// Guard users are evaluated in.
    pub fn guard(&self) -> &Guard {
        &self.config.guard
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<RoleSystemMetrics> {
        &self.metrics
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // Transaction plumbing

    pub(crate) fn read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Tables) -> Result<T>,
    {
        self.storage
            .read(op)
            .inspect_err(|e| self.metrics.record_error(e.kind()))
    }

    /// Run a graph mutation. The cache is flushed inside the transaction.
    pub(crate) fn mutate<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Tables) -> Result<T>,
    {
        let result = self.storage.transaction(|tables| {
            let output = op(tables)?;
            self.cache.flush();
            Ok(output)
        });

        match &result {
            Ok(_) => self.metrics.record_mutation(),
            Err(e) => self.metrics.record_error(e.kind()),
        }
        result
    }

    /// Run a mutation that does not touch the permission graph.
    pub(crate) fn mutate_records<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Tables) -> Result<T>,
    {
        self.storage
            .transaction(op)
            .inspect_err(|e| self.metrics.record_error(e.kind()))
    }

    pub(crate) fn audit_enabled(&self) -> bool {
        self.config.enable_audit
    }

    // Permission registry

    /// Create a permission. Fails if `(name, guard)` is taken.
    pub fn create_permission(&self, name: &str, guard: &Guard) -> Result<Permission> {
        validate_name("permission", name)?;
        let permission = self.mutate(|tables| self.insert_permission(tables, name, guard))?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!("Permission '{permission}' created");
        }

        Ok(permission)
    }

    /// Create the permission unless it already exists.
    pub fn ensure_permission(&self, name: &str, guard: &Guard) -> Result<Permission> {
        validate_name("permission", name)?;

        if let Some(existing) = self.read(|tables| Ok(tables.permission_by_name(name, guard).cloned()))? {
            return Ok(existing);
        }

        self.mutate(|tables| match tables.permission_by_name(name, guard) {
            Some(existing) => Ok(existing.clone()),
            None => self.insert_permission(tables, name, guard),
        })
    }

    fn insert_permission(&self, tables: &mut Tables, name: &str, guard: &Guard) -> Result<Permission> {
        if tables.permission_by_name(name, guard).is_some() {
            return Err(Error::PermissionAlreadyExists {
                name: name.to_string(),
                guard: guard.to_string(),
            });
        }

        let id = tables.next_permission_id();
        let permission = Permission::new(id, name.to_string(), guard.clone());
        tables.permissions.insert(id, permission.clone());

        if self.config.super_admin_policy == SuperAdminPolicy::GrantOnCreate
            && let Some(super_admin) = tables.role_by_name(SUPER_ADMIN_ROLE, guard).map(Role::id)
        {
            tables.role_permissions.insert(super_admin, id);
        }

        Ok(permission)
    }

    /// Get a permission by id.
    pub fn find_permission(&self, id: PermissionId) -> Result<Permission> {
        self.read(|tables| tables.permission(id).cloned())
    }

    /// Get a permission by name within a guard.
    pub fn find_permission_by_name(&self, name: &str, guard: &Guard) -> Result<Permission> {
        self.read(|tables| {
            tables
                .permission_by_name(name, guard)
                .cloned()
                .ok_or_else(|| Error::PermissionNotFound(name.to_string()))
        })
    }

    /// List every permission, optionally joined with the roles that reference it.
    pub fn list_permissions(&self, with_roles: bool) -> Result<Vec<PermissionEntry>> {
        self.read(|tables| {
            Ok(tables
                .permissions
                .values()
                .map(|permission| PermissionEntry {
                    roles: with_roles.then(|| {
                        tables
                            .role_permissions
                            .sources(permission.id())
                            .filter_map(|role| tables.roles.get(&role).cloned())
                            .collect()
                    }),
                    permission: permission.clone(),
                })
                .collect())
        })
    }

    /// Rename a permission that nothing references yet.
    ///
    /// With [`SuperAdminPolicy::GrantOnCreate`] and a `super-admin` role in
    /// the permission's guard, every permission there is referenced from the
    /// moment it is created, so renames fail with
    /// [`Error::ProtectedEntity`]. Renaming to the current name still succeeds.
    pub fn rename_permission(&self, id: PermissionId, new_name: &str) -> Result<Permission> {
        validate_name("permission", new_name)?;

        let permission = self.mutate(|tables| {
            let current = tables.permission(id)?;
            if current.name() == new_name {
                return Ok(current.clone());
            }

            if tables.permission_is_referenced(id) {
                return Err(Error::ProtectedEntity(format!(
                    "permission '{}' is assigned and cannot be renamed",
                    current.name()
                )));
            }

            let guard = current.guard().clone();
            if tables.permission_by_name(new_name, &guard).is_some() {
                return Err(Error::PermissionAlreadyExists {
                    name: new_name.to_string(),
                    guard: guard.to_string(),
                });
            }

            let permission = tables
                .permissions
                .get_mut(&id)
                .ok_or_else(|| Error::PermissionNotFound(id.to_string()))?;
            permission.rename(new_name.to_string());
            Ok(permission.clone())
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!("Permission {id} renamed to '{new_name}'");
        }

        Ok(permission)
    }

    /// Detach a permission from every role and user, then delete it.
    pub fn delete_permission(&self, id: PermissionId) -> Result<()> {
        let (_name, _detached) = self.mutate(|tables| {
            let name = tables.permission(id)?.to_string();
            let detached = tables.remove_permission(id)?;
            Ok((name, detached))
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!("Permission '{_name}' deleted, {_detached} edge(s) detached");
        }

        Ok(())
    }

    // Role store

    /// Create a role with an initial permission set.
    ///
    /// Fails without creating anything if a permission name does not resolve
    /// in `guard`.
    pub fn create_role(&self, name: &str, guard: &Guard, permissions: &[&str]) -> Result<RoleEntry> {
        validate_name("role", name)?;
        let entry = self.mutate(|tables| self.insert_role(tables, name, guard, permissions))?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!(
                "Role '{}' created for guard '{guard}' with {} permission(s)",
                entry.role.name(),
                entry.permissions.len()
            );
        }

        Ok(entry)
    }

    /// Create the role unless it exists, then grant it `permissions` additively.
    pub fn ensure_role(&self, name: &str, guard: &Guard, permissions: &[&str]) -> Result<RoleEntry> {
        validate_name("role", name)?;

        self.mutate(|tables| {
            let Some(id) = tables.role_by_name(name, guard).map(Role::id) else {
                return self.insert_role(tables, name, guard, permissions);
            };

            for permission in tables.resolve_permissions(permissions, guard)? {
                tables.role_permissions.insert(id, permission);
            }
            RoleEntry::load(tables, id)
        })
    }

    fn insert_role(
        &self,
        tables: &mut Tables,
        name: &str,
        guard: &Guard,
        permissions: &[&str],
    ) -> Result<RoleEntry> {
        if tables.role_by_name(name, guard).is_some() {
            return Err(Error::RoleAlreadyExists {
                name: name.to_string(),
                guard: guard.to_string(),
            });
        }

        let mut granted = tables.resolve_permissions(permissions, guard)?;
        if name == SUPER_ADMIN_ROLE && self.config.super_admin_policy == SuperAdminPolicy::GrantOnCreate {
            granted.extend(
                tables
                    .permissions
                    .values()
                    .filter(|p| p.guard() == guard)
                    .map(Permission::id),
            );
        }

        let id = tables.next_role_id();
        tables
            .roles
            .insert(id, Role::new(id, name.to_string(), guard.clone()));
        tables.role_permissions.replace(id, granted);
        RoleEntry::load(tables, id)
    }

    /// Get a role by id.
    pub fn find_role(&self, id: RoleId) -> Result<Role> {
        self.read(|tables| tables.role(id).cloned())
    }

    /// Get a role by name within a guard.
    pub fn find_role_by_name(&self, name: &str, guard: &Guard) -> Result<Role> {
        self.read(|tables| {
            tables
                .role_by_name(name, guard)
                .cloned()
                .ok_or_else(|| Error::RoleNotFound(name.to_string()))
        })
    }

    /// Get a role together with its permission names.
    pub fn role_entry(&self, id: RoleId) -> Result<RoleEntry> {
        self.read(|tables| RoleEntry::load(tables, id))
    }

    /// List every role with its permission names.
    pub fn list_roles(&self) -> Result<Vec<RoleEntry>> {
        self.read(|tables| {
            tables
                .roles
                .keys()
                .map(|&id| RoleEntry::load(tables, id))
                .collect()
        })
    }

    /// Names of the permissions a role grants.
    pub fn role_permissions(&self, id: RoleId) -> Result<BTreeSet<String>> {
        self.read(|tables| {
            tables.role(id)?;
            Ok(tables.role_permission_names(id))
        })
    }

    /// Rename a role and/or replace its permission set in one step.
    pub fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<RoleEntry> {
        if let Some(name) = &update.name {
            validate_name("role", name)?;
        }

        let entry = self.mutate(|tables| {
            let role = tables.role(id)?;
            let guard = role.guard().clone();

            if let Some(permissions) = &update.permissions {
                let granted = tables.resolve_permissions(permissions, &guard)?;
                tables.role_permissions.replace(id, granted);
            }

            if let Some(name) = &update.name
                && name != tables.role(id)?.name()
            {
                let role = tables.role(id)?;
                if role.is_super_admin() || name == SUPER_ADMIN_ROLE {
                    return Err(Error::ProtectedEntity(format!(
                        "role '{SUPER_ADMIN_ROLE}' cannot be renamed or impersonated"
                    )));
                }
                if tables.role_by_name(name, &guard).is_some() {
                    return Err(Error::RoleAlreadyExists {
                        name: name.clone(),
                        guard: guard.to_string(),
                    });
                }
                tables.role_mut(id)?.rename(name.clone());
            } else {
                tables.role_mut(id)?.touch();
            }

            RoleEntry::load(tables, id)
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!("Role {id} updated ('{}')", entry.role.name());
        }

        Ok(entry)
    }

    /// Detach a role from its users and permissions, then delete it.
    /// The `super-admin` role cannot be deleted.
    pub fn delete_role(&self, id: RoleId) -> Result<()> {
        let result = self.mutate(|tables| {
            let role = tables.role(id)?;
            if role.is_super_admin() {
                return Err(Error::ProtectedEntity(format!(
                    "role '{SUPER_ADMIN_ROLE}' cannot be deleted"
                )));
            }
            let name = role.name().to_string();
            let detached = tables.remove_role(id)?;
            Ok((name, detached))
        });

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            match &result {
                Ok((name, detached)) => info!("Role '{name}' deleted, {detached} edge(s) detached"),
                Err(e) if e.is_forbidden() => warn!("Refused to delete role {id}: {e}"),
                Err(_) => {}
            }
        }

        result.map(|_| ())
    }

    /// Grant one permission to a role. Returns false if it was already granted.
    pub fn assign_permission_to_role(&self, role: RoleId, permission: &str) -> Result<bool> {
        Ok(self.assign_permissions_to_role(role, &[permission])? > 0)
    }

    /// Grant several permissions to a role. Returns how many edges were added.
    pub fn assign_permissions_to_role(&self, role: RoleId, permissions: &[&str]) -> Result<usize> {
        let added = self.mutate(|tables| {
            let guard = tables.role(role)?.guard().clone();
            let ids = tables.resolve_permissions(permissions, &guard)?;
            let added = ids
                .into_iter()
                .filter(|&permission| tables.role_permissions.insert(role, permission))
                .count();
            if added > 0 {
                tables.role_mut(role)?.touch();
            }
            Ok(added)
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() && added > 0 {
            info!("{added} permission(s) assigned to role {role}");
        }

        Ok(added)
    }

    /// Revoke one permission from a role. Returns false if it was not granted.
    pub fn revoke_permission_from_role(&self, role: RoleId, permission: &str) -> Result<bool> {
        Ok(self.revoke_permissions_from_role(role, &[permission])? > 0)
    }

    /// Revoke several permissions from a role. Returns how many edges were removed.
    pub fn revoke_permissions_from_role(&self, role: RoleId, permissions: &[&str]) -> Result<usize> {
        let removed = self.mutate(|tables| {
            let guard = tables.role(role)?.guard().clone();
            let ids = tables.resolve_permissions(permissions, &guard)?;
            let removed = ids
                .into_iter()
                .filter(|&permission| tables.role_permissions.remove(role, permission))
                .count();
            if removed > 0 {
                tables.role_mut(role)?.touch();
            }
            Ok(removed)
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() && removed > 0 {
            info!("{removed} permission(s) revoked from role {role}");
        }

        Ok(removed)
    }

    // Authorization evaluator

    /// Decide whether `user` holds `permission`.
    ///
    /// Unknown permission names evaluate to `false`; only an unknown user is
    /// an error.
    pub fn authorize(&self, user: UserId, permission: impl AsRef<str>) -> Result<bool> {
        let permission = permission.as_ref();
        let granted = self.read(|tables| {
            tables.user(user)?;
            Ok(self.evaluate(tables, user, permission))
        })?;

        self.metrics.record_permission_check(granted);

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            if granted {
                info!("Permission GRANTED for user {user}, permission '{permission}'");
            } else {
                warn!("Permission DENIED for user {user}, permission '{permission}'");
            }
        }

        Ok(granted)
    }

    /// Like [`authorize`](Self::authorize) but returns an [`AccessResult`].
    pub fn check(&self, user: UserId, permission: impl AsRef<str>) -> Result<AccessResult> {
        let permission = permission.as_ref();
        Ok(if self.authorize(user, permission)? {
            AccessResult::Granted
        } else {
            AccessResult::Denied(format!("missing permission '{permission}'"))
        })
    }

    /// Guard for handlers: `Ok(())` if granted, `PermissionDenied` otherwise.
    pub fn require(&self, user: UserId, permission: impl AsRef<str>) -> Result<()> {
        let permission = permission.as_ref();
        if self.authorize(user, permission)? {
            Ok(())
        } else {
            Err(Error::PermissionDenied(permission.to_string()))
        }
    }

    fn evaluate(&self, tables: &Tables, user: UserId, permission: &str) -> bool {
        let roles = self.cached_user_roles(tables, user);

        if self.bypasses(tables, &roles) {
            return true;
        }

        self.cached_direct_permissions(tables, user).contains(permission)
            || roles
                .iter()
                .any(|&role| self.cached_role_permissions(tables, role).contains(permission))
    }

    /// Whether `roles` include the system guard's `super-admin` under
    /// [`SuperAdminPolicy::Bypass`].
    fn bypasses(&self, tables: &Tables, roles: &BTreeSet<RoleId>) -> bool {
        self.config.super_admin_policy == SuperAdminPolicy::Bypass
            && roles
                .iter()
                .filter_map(|role| tables.roles.get(role))
                .any(|role| role.is_super_admin() && role.guard() == &self.config.guard)
    }

    /// Whether every check for `user` passes regardless of the graph.
    pub(crate) fn user_bypasses(&self, tables: &Tables, user: UserId) -> bool {
        self.bypasses(tables, &self.cached_user_roles(tables, user))
    }

    /// Effective permission names, composed from the cache.
    pub(crate) fn compose_effective(&self, tables: &Tables, user: UserId) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.cached_direct_permissions(tables, user).as_ref().clone();
        for &role in self.cached_user_roles(tables, user).iter() {
            names.extend(self.cached_role_permissions(tables, role).iter().cloned());
        }
        names
    }

    fn cached_user_roles(&self, tables: &Tables, user: UserId) -> Arc<BTreeSet<RoleId>> {
        self.cache
            .user_roles(user, || tables.user_roles.targets(user).collect())
    }

    fn cached_role_permissions(&self, tables: &Tables, role: RoleId) -> Arc<BTreeSet<String>> {
        self.cache
            .role_permissions(role, || tables.role_permission_names(role))
    }

    fn cached_direct_permissions(&self, tables: &Tables, user: UserId) -> Arc<BTreeSet<String>> {
        self.cache.direct_permissions(user, || {
            tables.permission_names(tables.user_permissions.targets(user))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::NewUser;

    fn api() -> Guard {
        Guard::default()
    }

    fn system_with_viewer() -> (RoleSystem, UserId) {
        let system = RoleSystem::new();
        system.create_permission("view-product", &api()).unwrap();
        system.create_permission("edit-product", &api()).unwrap();
        system.create_role("viewer", &api(), &["view-product"]).unwrap();
        let user = system
            .create_user(NewUser::new("Ada", "ada@example.com", "hash").role("viewer"))
            .unwrap();
        (system, user.id())
    }

    #[test]
    fn test_create_permission_rejects_duplicates_per_guard() {
        let system = RoleSystem::new();
        system.create_permission("view-product", &api()).unwrap();

        let err = system.create_permission("view-product", &api()).unwrap_err();
        assert!(matches!(err, Error::PermissionAlreadyExists { .. }));

        let web = Guard::new("web").unwrap();
        assert!(system.create_permission("view-product", &web).is_ok());
    }

    #[test]
    fn test_ensure_permission_is_idempotent() {
        let system = RoleSystem::new();
        let first = system.ensure_permission("view-product", &api()).unwrap();
        let second = system.ensure_permission("view-product", &api()).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(system.list_permissions(false).unwrap().len(), 1);
    }

    #[test]
    fn test_ensure_role_grants_additively() {
        let (system, _) = system_with_viewer();
        system.create_permission("export", &api()).unwrap();
        let viewer = system.find_role_by_name("viewer", &api()).unwrap().id();
        assert!(system.assign_permission_to_role(viewer, "export").unwrap());

        let entry = system.ensure_role("viewer", &api(), &["edit-product"]).unwrap();
        assert_eq!(entry.role.id(), viewer);
        let expected: BTreeSet<String> = ["edit-product", "export", "view-product"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(entry.permissions, expected);
        assert_eq!(system.list_roles().unwrap().len(), 1);

        let err = system.ensure_role("viewer", &api(), &["ghost"]).unwrap_err();
        assert!(err.is_not_found());
        let err = system.ensure_role("auditor", &api(), &["ghost"]).unwrap_err();
        assert!(err.is_not_found());
        assert!(system.find_role_by_name("auditor", &api()).is_err());
        assert_eq!(system.role_permissions(viewer).unwrap(), expected);
    }

    #[test]
    fn test_rename_blocked_once_super_admin_holds_every_permission() {
        let system = RoleSystem::new();
        system.create_role(SUPER_ADMIN_ROLE, &api(), &[]).unwrap();
        let permission = system.create_permission("export", &api()).unwrap();

        let err = system.rename_permission(permission.id(), "export-all").unwrap_err();
        assert!(matches!(err, Error::ProtectedEntity(_)));
        assert!(system.rename_permission(permission.id(), "export").is_ok());

        let config = RoleSystemConfigBuilder::new()
            .super_admin_policy(SuperAdminPolicy::Bypass)
            .build()
            .unwrap();
        let system = RoleSystem::with_config(config);
        system.create_role(SUPER_ADMIN_ROLE, &api(), &[]).unwrap();
        let permission = system.create_permission("export", &api()).unwrap();
        assert_eq!(
            system.rename_permission(permission.id(), "export-all").unwrap().name(),
            "export-all"
        );
    }

    #[test]
    fn test_create_permission_validates_name() {
        let system = RoleSystem::new();
        let err = system.create_permission("  ", &api()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_list_permissions_with_roles() {
        let (system, _) = system_with_viewer();

        let plain = system.list_permissions(false).unwrap();
        assert!(plain.iter().all(|entry| entry.roles.is_none()));

        let joined = system.list_permissions(true).unwrap();
        let view = joined
            .iter()
            .find(|entry| entry.permission.name() == "view-product")
            .unwrap();
        let roles: Vec<&str> = view.roles.as_ref().unwrap().iter().map(Role::name).collect();
        assert_eq!(roles, vec!["viewer"]);
    }

    #[test]
    fn test_create_role_with_unknown_permission_creates_nothing() {
        let system = RoleSystem::new();
        system.create_permission("view-product", &api()).unwrap();

        let err = system
            .create_role("viewer", &api(), &["view-product", "missing"])
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(system.list_roles().unwrap().is_empty());
    }

    #[test]
    fn test_update_role_replaces_permissions() {
        let (system, _) = system_with_viewer();
        let viewer = system.find_role_by_name("viewer", &api()).unwrap();

        let entry = system
            .update_role(viewer.id(), RoleUpdate::new().permissions(["edit-product"]))
            .unwrap();
        assert_eq!(entry.permissions, BTreeSet::from(["edit-product".to_string()]));

        let entry = system
            .update_role(viewer.id(), RoleUpdate::new().name("editor"))
            .unwrap();
        assert_eq!(entry.role.name(), "editor");
        assert_eq!(entry.permissions.len(), 1);
    }

    #[test]
    fn test_update_role_failure_is_atomic() {
        let (system, _) = system_with_viewer();
        let viewer = system.find_role_by_name("viewer", &api()).unwrap();
        system.create_role("other", &api(), &[]).unwrap();

        let err = system
            .update_role(
                viewer.id(),
                RoleUpdate::new().permissions(["edit-product"]).name("other"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::RoleAlreadyExists { .. }));

        let entry = system.role_entry(viewer.id()).unwrap();
        assert_eq!(entry.role.name(), "viewer");
        assert_eq!(entry.permissions, BTreeSet::from(["view-product".to_string()]));
    }

    #[test]
    fn test_super_admin_cannot_be_renamed() {
        let system = RoleSystem::new();
        let super_admin = system.create_role(SUPER_ADMIN_ROLE, &api(), &[]).unwrap();
        let viewer = system.create_role("viewer", &api(), &[]).unwrap();

        let err = system
            .update_role(super_admin.role.id(), RoleUpdate::new().name("root"))
            .unwrap_err();
        assert!(err.is_forbidden());

        let err = system
            .update_role(viewer.role.id(), RoleUpdate::new().name(SUPER_ADMIN_ROLE))
            .unwrap_err();
        assert!(err.is_forbidden());
    }

    #[test]
    fn test_assign_and_revoke_are_idempotent() {
        let (system, _) = system_with_viewer();
        let viewer = system.find_role_by_name("viewer", &api()).unwrap();

        assert!(system.assign_permission_to_role(viewer.id(), "edit-product").unwrap());
        assert!(!system.assign_permission_to_role(viewer.id(), "edit-product").unwrap());
        assert_eq!(system.role_permissions(viewer.id()).unwrap().len(), 2);

        assert!(system.revoke_permission_from_role(viewer.id(), "edit-product").unwrap());
        assert!(!system.revoke_permission_from_role(viewer.id(), "edit-product").unwrap());
        assert_eq!(system.role_permissions(viewer.id()).unwrap().len(), 1);

        let err = system
            .assign_permission_to_role(viewer.id(), "no-such-permission")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_authorize_unknown_user_is_not_found() {
        let system = RoleSystem::new();
        assert!(system.authorize(UserId(99), "view-product").unwrap_err().is_not_found());
    }

    #[test]
    fn test_authorize_and_check() {
        let (system, user) = system_with_viewer();

        assert!(system.authorize(user, "view-product").unwrap());
        assert!(!system.authorize(user, "edit-product").unwrap());
        assert!(!system.authorize(user, "never-created").unwrap());

        let denied = system.check(user, "edit-product").unwrap();
        assert!(denied.is_denied());
        assert_eq!(denied.denial_reason(), Some("missing permission 'edit-product'"));

        assert!(system.require(user, "view-product").is_ok());
        assert!(system.require(user, "edit-product").unwrap_err().is_forbidden());
    }

    #[test]
    fn test_delete_permission_flushes_cache() {
        let (system, user) = system_with_viewer();
        assert!(system.authorize(user, "view-product").unwrap());
        let generation = system.cache().generation();

        let permission = system.find_permission_by_name("view-product", &api()).unwrap();
        system.delete_permission(permission.id()).unwrap();

        assert!(system.cache().generation() > generation);
        assert!(!system.authorize(user, "view-product").unwrap());
    }

    #[test]
    fn test_rename_permission() {
        let (system, _) = system_with_viewer();
        let view = system.find_permission_by_name("view-product", &api()).unwrap();
        let edit = system.find_permission_by_name("edit-product", &api()).unwrap();

        assert!(system.rename_permission(view.id(), "view-products").unwrap_err().is_forbidden());

        let renamed = system.rename_permission(edit.id(), "update-product").unwrap();
        assert_eq!(renamed.name(), "update-product");

        let err = system.rename_permission(edit.id(), "view-product").unwrap_err();
        assert!(matches!(err, Error::PermissionAlreadyExists { .. }));
    }

    #[test]
    fn test_config_builder_and_json() {
        let config = RoleSystemConfigBuilder::new()
            .enable_caching(false)
            .enable_audit(false)
            .build()
            .unwrap();
        assert!(!config.enable_caching);
        assert_eq!(config.guard.as_str(), "api");

        assert!(RoleSystemConfigBuilder::new().guard("").build().is_err());

        let config = RoleSystemConfig::from_json(r#"{"super_admin_policy": "bypass"}"#).unwrap();
        assert_eq!(config.super_admin_policy, SuperAdminPolicy::Bypass);
        assert!(config.enable_caching);

        assert!(RoleSystemConfig::from_json(r#"{"guard": ""}"#).is_err());
    }

    #[test]
    fn test_access_result_from_bool() {
        assert!(AccessResult::from(true).is_granted());
        assert_eq!(
            AccessResult::from(false).denial_reason(),
            Some("Access denied")
        );
    }
}
