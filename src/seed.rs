//! Bootstrap of the default permissions, roles and super-admin account.
//!
//! Every function here is idempotent and can run on each start.

#[cfg(feature = "audit")]
use log::info;

use crate::{
    catalog::Ability,
    core::{RoleEntry, RoleSystem},
    error::{Error, Result},
    role::SUPER_ADMIN_ROLE,
    storage::Storage,
    user::{NewUser, User},
};

/// Role granted product management without user or role administration.
pub const DELEGATED_ADMIN_ROLE: &str = "delegated-admin";

/// Role that can only read products.
pub const VIEWER_ROLE: &str = "viewer";

/// Credentials of the bootstrap administrator.
#[derive(Clone)]
pub struct SuperAdminAccount {
    pub name: String,
    pub email: String,
    pub credential_hash: String,
}

impl SuperAdminAccount {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        credential_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            credential_hash: credential_hash.into(),
        }
    }
}

impl std::fmt::Debug for SuperAdminAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperAdminAccount")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Create every catalog permission and the three default roles in the
/// system guard. Existing records are kept; missing grants are added.
pub fn seed_defaults<S: Storage>(system: &RoleSystem<S>) -> Result<Vec<RoleEntry>> {
    let guard = system.guard().clone();

    for name in Ability::names() {
        system.ensure_permission(name, &guard)?;
    }

    let everything: Vec<&str> = Ability::names().collect();
    let product_admin = [
        Ability::CreateProduct.as_str(),
        Ability::EditProduct.as_str(),
        Ability::ViewProduct.as_str(),
    ];

    let roles = vec![
        system.ensure_role(SUPER_ADMIN_ROLE, &guard, &everything)?,
        system.ensure_role(DELEGATED_ADMIN_ROLE, &guard, &product_admin)?,
        system.ensure_role(VIEWER_ROLE, &guard, &[Ability::ViewProduct.as_str()])?,
    ];

    #[cfg(feature = "audit")]
    if system.audit_enabled() {
        info!(
            "Seeded {} permission(s) and {} role(s) for guard '{guard}'",
            everything.len(),
            roles.len()
        );
    }

    Ok(roles)
}

/// Find the account by email or create it, then make sure it holds
/// `super-admin`. The role must already exist.
pub fn ensure_super_admin<S: Storage>(system: &RoleSystem<S>, account: &SuperAdminAccount) -> Result<User> {
    let user = match system.find_user_by_email(&account.email) {
        Ok(user) => user,
        Err(Error::UserNotFound(_)) => system.create_user(NewUser::new(
            account.name.clone(),
            account.email.clone(),
            account.credential_hash.clone(),
        ))?,
        Err(e) => return Err(e),
    };

    system.assign_role(user.id(), SUPER_ADMIN_ROLE)?;
    Ok(user)
}

/// Fail with `PermissionNotFound` naming the first catalog ability that has
/// no record in the system guard.
pub fn verify_catalog<S: Storage>(system: &RoleSystem<S>) -> Result<()> {
    let guard = system.guard().clone();
    let missing = system.read(|tables| {
        Ok(Ability::names().find(|name| tables.permission_by_name(name, &guard).is_none()))
    })?;

    match missing {
        Some(name) => Err(Error::PermissionNotFound(name.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Guard, RoleSystem};

    #[test]
    fn test_seed_defaults_is_idempotent() {
        let system = RoleSystem::new();
        seed_defaults(&system).unwrap();
        seed_defaults(&system).unwrap();

        assert_eq!(system.list_permissions(false).unwrap().len(), Ability::ALL.len());
        assert_eq!(system.list_roles().unwrap().len(), 3);

        let api = Guard::default();
        let super_admin = system.find_role_by_name(SUPER_ADMIN_ROLE, &api).unwrap();
        assert_eq!(
            system.role_permissions(super_admin.id()).unwrap().len(),
            Ability::ALL.len()
        );

        let delegated = system.find_role_by_name(DELEGATED_ADMIN_ROLE, &api).unwrap();
        assert_eq!(system.role_permissions(delegated.id()).unwrap().len(), 3);
    }

    #[test]
    fn test_ensure_super_admin() {
        let system = RoleSystem::new();
        let account = SuperAdminAccount::new("Super Admin", "superadmin@example.com", "hash");

        assert!(ensure_super_admin(&system, &account).unwrap_err().is_not_found());

        seed_defaults(&system).unwrap();
        let first = ensure_super_admin(&system, &account).unwrap();
        let second = ensure_super_admin(&system, &account).unwrap();
        assert_eq!(first.id(), second.id());

        for ability in Ability::ALL {
            assert!(system.authorize(first.id(), ability).unwrap());
        }
        assert!(system.delete_user(first.id()).unwrap_err().is_forbidden());
    }

    #[test]
    fn test_verify_catalog() {
        let system = RoleSystem::new();
        let err = verify_catalog(&system).unwrap_err();
        assert!(matches!(err, Error::PermissionNotFound(ref name) if name == "view-product"));

        seed_defaults(&system).unwrap();
        assert!(verify_catalog(&system).is_ok());

        let view = system
            .find_permission_by_name("view-users", system.guard())
            .unwrap();
        system.delete_permission(view.id()).unwrap();
        assert!(verify_catalog(&system).is_err());
    }

    #[test]
    fn test_super_admin_account_debug_hides_hash() {
        let account = SuperAdminAccount::new("Root", "root@example.com", "top-secret");
        assert!(!format!("{account:?}").contains("top-secret"));
    }
}
