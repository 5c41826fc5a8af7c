//! Async support for the role system (requires 'async' feature).
//!
//! The core is synchronous and guarded by blocking locks, so each call is
//! moved onto tokio's blocking pool instead of holding a runtime worker.

use crate::{
    assignment::UserEntry,
    core::{RoleEntry, RoleSystem},
    error::{Error, Result},
    permission::Permission,
    role::{RoleId, RoleUpdate},
    storage::{MemoryStorage, Storage},
    user::{NewUser, User, UserId},
};
use std::{collections::BTreeSet, sync::Arc};

/// Async wrapper around a shared role system.
pub struct AsyncRoleSystem<S = MemoryStorage>
where
    S: Storage + 'static,
{
    inner: Arc<RoleSystem<S>>,
}

impl<S> Clone for AsyncRoleSystem<S>
where
    S: Storage + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> AsyncRoleSystem<S>
where
    S: Storage + 'static,
{
    /// Create a new async role system.
    pub fn new(role_system: RoleSystem<S>) -> Self {
        Self::from_shared(Arc::new(role_system))
    }

    /// Wrap a system that is also used synchronously elsewhere.
    pub fn from_shared(inner: Arc<RoleSystem<S>>) -> Self {
        Self { inner }
    }

    /// The wrapped system.
    pub fn inner(&self) -> &Arc<RoleSystem<S>> {
        &self.inner
    }

    /// Run `op` against the system on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&RoleSystem<S>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let system = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&system))
            .await
            .map_err(|e| Error::Storage(format!("blocking task failed: {e}")))?
    }

    /// Decide whether `user` holds `permission`.
    pub async fn authorize(&self, user: UserId, permission: impl Into<String>) -> Result<bool> {
        let permission = permission.into();
        self.run(move |system| system.authorize(user, &permission)).await
    }

    /// `Ok(())` if granted, `PermissionDenied` otherwise.
    pub async fn require(&self, user: UserId, permission: impl Into<String>) -> Result<()> {
        let permission = permission.into();
        self.run(move |system| system.require(user, &permission)).await
    }

    /// Evaluate several permissions for one user in a single blocking call.
    pub async fn batch_authorize(
        &self,
        user: UserId,
        permissions: Vec<String>,
    ) -> Result<Vec<(String, bool)>> {
        self.run(move |system| {
            permissions
                .into_iter()
                .map(|permission| {
                    let granted = system.authorize(user, &permission)?;
                    Ok((permission, granted))
                })
                .collect()
        })
        .await
    }

    pub async fn effective_permissions(&self, user: UserId) -> Result<BTreeSet<String>> {
        self.run(move |system| system.effective_permissions(user)).await
    }

    pub async fn create_permission(&self, name: impl Into<String>) -> Result<Permission> {
        let name = name.into();
        self.run(move |system| system.create_permission(&name, system.guard()))
            .await
    }

    pub async fn create_role(
        &self,
        name: impl Into<String>,
        permissions: Vec<String>,
    ) -> Result<RoleEntry> {
        let name = name.into();
        self.run(move |system| {
            let names: Vec<&str> = permissions.iter().map(String::as_str).collect();
            system.create_role(&name, system.guard(), &names)
        })
        .await
    }

    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<RoleEntry> {
        self.run(move |system| system.update_role(id, update)).await
    }

    pub async fn delete_role(&self, id: RoleId) -> Result<()> {
        self.run(move |system| system.delete_role(id)).await
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        self.run(move |system| system.create_user(new_user)).await
    }

    pub async fn user_entry(&self, id: UserId) -> Result<UserEntry> {
        self.run(move |system| system.user_entry(id)).await
    }

    pub async fn assign_role(&self, user: UserId, role: impl Into<String>) -> Result<bool> {
        let role = role.into();
        self.run(move |system| system.assign_role(user, &role)).await
    }

    pub async fn revoke_role(&self, user: UserId, role: impl Into<String>) -> Result<bool> {
        let role = role.into();
        self.run(move |system| system.revoke_role(user, &role)).await
    }

    pub async fn sync_roles(&self, user: UserId, roles: Vec<String>) -> Result<()> {
        self.run(move |system| {
            let names: Vec<&str> = roles.iter().map(String::as_str).collect();
            system.sync_roles(user, &names)
        })
        .await
    }

    pub async fn delete_user(&self, id: UserId) -> Result<()> {
        self.run(move |system| system.delete_user(id)).await
    }
}
