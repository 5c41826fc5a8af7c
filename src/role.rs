//! Role definitions.

use crate::permission::Guard;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

entity_id! {
    /// Identifier of a role record.
    RoleId
}

/// Name of the protected role. It cannot be deleted or renamed, and
/// users holding it cannot be deleted.
pub const SUPER_ADMIN_ROLE: &str = "super-admin";

/// A named role. Its permissions live in the role-permission edge set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: String,
    guard: Guard,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Role {
    pub(crate) fn new(id: RoleId, name: String, guard: Guard) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            guard,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get the role's unique identifier.
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Get the role's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the guard this role belongs to.
    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether this is the protected `super-admin` role.
    pub fn is_super_admin(&self) -> bool {
        self.name == SUPER_ADMIN_ROLE
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Changes applied by `RoleSystem::update_role`.
///
/// `permissions`, when present, replaces the role's whole permission set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub permissions: Option<Vec<String>>,
}

impl RoleUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename the role.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the role's permission set with exactly these names.
    pub fn permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.permissions = Some(permissions.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_creation() {
        let role = Role::new(RoleId(3), "viewer".into(), Guard::default());
        assert_eq!(role.id(), RoleId(3));
        assert_eq!(role.name(), "viewer");
        assert_eq!(role.guard().as_str(), "api");
        assert!(!role.is_super_admin());
    }

    #[test]
    fn test_super_admin_detection() {
        let role = Role::new(RoleId(1), SUPER_ADMIN_ROLE.into(), Guard::default());
        assert!(role.is_super_admin());
    }

    #[test]
    fn test_rename_touches_timestamp() {
        let mut role = Role::new(RoleId(1), "viewer".into(), Guard::default());
        let before = role.updated_at();
        role.rename("reader".into());
        assert_eq!(role.name(), "reader");
        assert!(role.updated_at() >= before);
    }

    #[test]
    fn test_role_update_builder() {
        let update = RoleUpdate::new()
            .name("editor")
            .permissions(["view-product", "edit-product"]);

        assert_eq!(update.name.as_deref(), Some("editor"));
        assert_eq!(
            update.permissions,
            Some(vec!["view-product".to_string(), "edit-product".to_string()])
        );
    }
}
