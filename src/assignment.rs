//! User records and their role and direct-permission edges.
//!
//! Role and permission names given here resolve in the system guard
//! ([`RoleSystem::guard`]). Every operation that changes an edge flushes the
//! permission cache as part of its transaction.

#[cfg(feature = "audit")]
use log::{info, warn};

use crate::{
    core::RoleSystem,
    error::{Error, Result},
    permission::validate_name,
    storage::{Storage, Tables},
    user::{NewUser, User, UserId, UserUpdate, validate_email},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// A user joined with role names and effective permission names.
///
/// This is the shape user listings expose; the credential hash is left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEntry {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub roles: BTreeSet<String>,
    /// Names granted through the graph.
    pub permissions: BTreeSet<String>,
    /// Set when the `Bypass` super-admin policy lets this user pass every
    /// check, including names absent from `permissions`.
    pub bypass: bool,
}

impl<S> RoleSystem<S>
where
    S: Storage,
{
    /// Create a user with its initial roles.
    ///
    /// Fails without creating anything if the email is taken or a role name
    /// does not resolve.
    pub fn create_user(&self, new_user: NewUser) -> Result<User> {
        new_user.validate()?;
        let guard = self.guard().clone();

        let user = self.mutate(|tables| {
            if tables.user_by_email(&new_user.email).is_some() {
                return Err(Error::UserAlreadyExists(new_user.email.clone()));
            }
            let roles = tables.resolve_roles(&new_user.roles, &guard)?;

            let id = tables.next_user_id();
            let user = User::new(id, new_user.name, new_user.email, new_user.credential_hash);
            tables.users.insert(id, user.clone());
            tables.user_roles.replace(id, roles);
            Ok(user)
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!("User {} created", user.id());
        }

        Ok(user)
    }

    /// Get a user by id.
    pub fn find_user(&self, id: UserId) -> Result<User> {
        self.read(|tables| tables.user(id).cloned())
    }

    /// Get a user by email.
    pub fn find_user_by_email(&self, email: &str) -> Result<User> {
        self.read(|tables| {
            tables
                .user_by_email(email)
                .cloned()
                .ok_or_else(|| Error::UserNotFound(email.to_string()))
        })
    }

    /// A user with its role names and effective permissions.
    pub fn user_entry(&self, id: UserId) -> Result<UserEntry> {
        self.read(|tables| self.load_entry(tables, id))
    }

    /// Every user with role names and effective permissions.
    pub fn list_users(&self) -> Result<Vec<UserEntry>> {
        self.read(|tables| {
            tables
                .users
                .keys()
                .map(|&id| self.load_entry(tables, id))
                .collect()
        })
    }

    fn load_entry(&self, tables: &Tables, id: UserId) -> Result<UserEntry> {
        let user = tables.user(id)?;
        Ok(UserEntry {
            id,
            name: user.name().to_string(),
            email: user.email().to_string(),
            created_at: user.created_at(),
            updated_at: user.updated_at(),
            roles: tables.user_role_names(id),
            permissions: self.compose_effective(tables, id),
            bypass: self.user_bypasses(tables, id),
        })
    }

    /// Update profile fields and, when `roles` is present, replace the role
    /// set exactly. An empty list removes every role, unless that would
    /// leave no user holding `super-admin`.
    pub fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User> {
        if let Some(name) = &update.name {
            validate_name("user", name)?;
        }
        if let Some(email) = &update.email {
            validate_email(email)?;
        }
        let guard = self.guard().clone();

        let user = self.mutate(|tables| {
            tables.user(id)?;

            if let Some(email) = &update.email
                && tables.user_by_email(email).is_some_and(|other| other.id() != id)
            {
                return Err(Error::UserAlreadyExists(email.clone()));
            }

            if let Some(roles) = &update.roles {
                let roles = tables.resolve_roles(roles, &guard)?;
                let had_holder = tables.has_super_admin_holder();
                tables.user_roles.replace(id, roles);
                tables.retain_super_admin_holder(had_holder)?;
            }

            let user = tables.user_mut(id)?;
            if let Some(name) = update.name {
                user.set_name(name);
            }
            if let Some(email) = update.email {
                user.set_email(email);
            }
            Ok(user.clone())
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!("User {id} updated");
        }

        Ok(user)
    }

    /// Delete a user and its edges. Holders of `super-admin` are protected.
    pub fn delete_user(&self, id: UserId) -> Result<()> {
        let result = self.mutate(|tables| {
            tables.user(id)?;
            if tables.user_holds_super_admin(id) {
                return Err(Error::ProtectedEntity(
                    "super-admin accounts cannot be deleted".to_string(),
                ));
            }
            tables.remove_user(id)
        });

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            match &result {
                Ok(detached) => info!("User {id} deleted, {detached} edge(s) detached"),
                Err(e) if e.is_forbidden() => warn!("Refused to delete user {id}: {e}"),
                Err(_) => {}
            }
        }

        result.map(|_| ())
    }

    // Role edges

    /// Replace the user's roles with exactly `roles`.
    pub fn sync_roles(&self, user: UserId, roles: &[&str]) -> Result<()> {
        let guard = self.guard().clone();
        let _changed = self.mutate(|tables| {
            tables.user(user)?;
            let roles = tables.resolve_roles(roles, &guard)?;
            let had_holder = tables.has_super_admin_holder();
            let changed = tables.user_roles.replace(user, roles);
            tables.retain_super_admin_holder(had_holder)?;
            Ok(changed)
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() && _changed {
            info!("Roles of user {user} synced to {roles:?}");
        }

        Ok(())
    }

    /// Give the user one role. Returns false if it was already held.
    pub fn assign_role(&self, user: UserId, role: &str) -> Result<bool> {
        let guard = self.guard().clone();
        let added = self.mutate(|tables| {
            tables.user(user)?;
            let id = tables
                .role_by_name(role, &guard)
                .map(|r| r.id())
                .ok_or_else(|| Error::RoleNotFound(role.to_string()))?;
            Ok(tables.user_roles.insert(user, id))
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() && added {
            info!("Role '{role}' assigned to user {user}");
        }

        Ok(added)
    }

    /// Take one role from the user. Returns false if it was not held.
    pub fn revoke_role(&self, user: UserId, role: &str) -> Result<bool> {
        let guard = self.guard().clone();
        let removed = self.mutate(|tables| {
            tables.user(user)?;
            let id = tables
                .role_by_name(role, &guard)
                .map(|r| r.id())
                .ok_or_else(|| Error::RoleNotFound(role.to_string()))?;
            let had_holder = tables.has_super_admin_holder();
            let removed = tables.user_roles.remove(user, id);
            tables.retain_super_admin_holder(had_holder)?;
            Ok(removed)
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() && removed {
            info!("Role '{role}' revoked from user {user}");
        }

        Ok(removed)
    }

    /// Names of the roles the user holds.
    pub fn user_roles(&self, user: UserId) -> Result<BTreeSet<String>> {
        self.read(|tables| {
            tables.user(user)?;
            Ok(tables.user_role_names(user))
        })
    }

    // Direct grants

    /// Grant a permission to the user directly. Returns false if already granted.
    pub fn give_permission_to_user(&self, user: UserId, permission: &str) -> Result<bool> {
        let guard = self.guard().clone();
        let added = self.mutate(|tables| {
            tables.user(user)?;
            let id = tables.resolve_permission(permission, &guard)?;
            Ok(tables.user_permissions.insert(user, id))
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() && added {
            info!("Permission '{permission}' granted directly to user {user}");
        }

        Ok(added)
    }

    /// Remove a direct grant. Role-derived access is unaffected.
    pub fn revoke_permission_from_user(&self, user: UserId, permission: &str) -> Result<bool> {
        let guard = self.guard().clone();
        let removed = self.mutate(|tables| {
            tables.user(user)?;
            let id = tables.resolve_permission(permission, &guard)?;
            Ok(tables.user_permissions.remove(user, id))
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() && removed {
            info!("Direct permission '{permission}' revoked from user {user}");
        }

        Ok(removed)
    }

    /// Replace the user's direct grants with exactly `permissions`.
    pub fn sync_user_permissions(&self, user: UserId, permissions: &[&str]) -> Result<()> {
        let guard = self.guard().clone();
        self.mutate(|tables| {
            tables.user(user)?;
            let ids = tables.resolve_permissions(permissions, &guard)?;
            tables.user_permissions.replace(user, ids);
            Ok(())
        })
    }

    /// Names of the permissions granted to the user directly.
    pub fn direct_permissions(&self, user: UserId) -> Result<BTreeSet<String>> {
        self.read(|tables| {
            tables.user(user)?;
            Ok(tables.permission_names(tables.user_permissions.targets(user)))
        })
    }

    /// Union of direct grants and the permissions of every held role.
    ///
    /// Under the `Bypass` super-admin policy a holder may pass checks for
    /// names missing here; [`UserEntry::bypass`] reports that.
    pub fn effective_permissions(&self, user: UserId) -> Result<BTreeSet<String>> {
        self.read(|tables| {
            tables.user(user)?;
            Ok(self.compose_effective(tables, user))
        })
    }

    /// Same as [`effective_permissions`](Self::effective_permissions) but
    /// computed from storage alone, bypassing the cache.
    pub fn recompute_effective_permissions(&self, user: UserId) -> Result<BTreeSet<String>> {
        self.read(|tables| {
            tables.user(user)?;
            let mut names = tables.permission_names(tables.user_permissions.targets(user));
            for role in tables.user_roles.targets(user) {
                names.extend(tables.role_permission_names(role));
            }
            Ok(names)
        })
    }
}
