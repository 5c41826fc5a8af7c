//! Framework-agnostic REST handlers.
//!
//! Each handler takes the id of the authenticated actor (resolved by the
//! host's identity layer) plus a deserialized request body and returns an
//! [`ApiResponse`] the host writes out verbatim. Handlers run in a fixed
//! order: authorize the actor, resolve the target, validate the input, act.
//! An unauthorized actor therefore gets `403` even for a missing target.
//!
//! Bodies use the envelope `{"success": bool, "data": ...}` on success and
//! `{"success": false, "message": ...}` on failure.

#[cfg(feature = "audit")]
use log::warn;

use crate::{
    assignment::UserEntry,
    catalog::Ability,
    core::RoleSystem,
    error::{Error, ErrorKind, Result},
    permission::PermissionId,
    product::{ProductDraft, ProductId},
    role::{RoleId, RoleUpdate},
    storage::{MemoryStorage, Storage},
    user::{NewUser, UserId, UserUpdate},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Minimum password length accepted by `register` and `create_user`.
pub const MIN_PASSWORD_LEN: usize = 8;

const DENIED_MESSAGE: &str = "You do not have permission to perform this action.";
const INTERNAL_MESSAGE: &str = "Internal server error.";

/// Password hashing collaborator. The core stores only its output.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Status code and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn data(status: u16, data: impl Serialize) -> Result<Self> {
        Ok(Self {
            status,
            body: json!({ "success": true, "data": serde_json::to_value(data)? }),
        })
    }

    fn data_with_message(status: u16, message: &str, data: impl Serialize) -> Result<Self> {
        Ok(Self {
            status,
            body: json!({
                "success": true,
                "message": message,
                "data": serde_json::to_value(data)?,
            }),
        })
    }

    fn message(status: u16, message: impl Into<String>) -> Self {
        let success = (200..300).contains(&status);
        Self {
            status,
            body: json!({ "success": success, "message": message.into() }),
        }
    }

    /// Map an error to its status code and a client-safe message.
    pub fn from_error(error: &Error) -> Self {
        let kind = error.kind();
        let message = match kind {
            ErrorKind::Forbidden if matches!(error, Error::PermissionDenied(_)) => {
                DENIED_MESSAGE.to_string()
            }
            ErrorKind::InternalError => INTERNAL_MESSAGE.to_string(),
            _ => error.to_string(),
        };
        Self::message(kind.status_code(), message)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<Result<ApiResponse>> for ApiResponse {
    fn from(result: Result<ApiResponse>) -> Self {
        result.unwrap_or_else(|e| ApiResponse::from_error(&e))
    }
}

// Request bodies

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    pub role_name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolePermissionsRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRequest {
    pub name: String,
}

#[derive(Clone, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Profile returned by `login` and `me`.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: UserEntry,
}

fn as_strs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Handler set over a shared role system.
pub struct Api<H, S = MemoryStorage>
where
    H: CredentialHasher,
    S: Storage,
{
    system: Arc<RoleSystem<S>>,
    hasher: H,
}

impl<H, S> Api<H, S>
where
    H: CredentialHasher,
    S: Storage,
{
    pub fn new(system: Arc<RoleSystem<S>>, hasher: H) -> Self {
        Self { system, hasher }
    }

    pub fn system(&self) -> &Arc<RoleSystem<S>> {
        &self.system
    }

    fn authorize(&self, actor: UserId, ability: Ability) -> Result<()> {
        let result = self.system.require(actor, ability);

        #[cfg(feature = "audit")]
        if let Err(Error::PermissionDenied(_)) = &result {
            warn!("Actor {actor} refused '{ability}'");
        }

        result
    }

    // Roles

    pub fn list_roles(&self, actor: UserId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::ViewRoles)?;
            ApiResponse::data(200, self.system.list_roles()?)
        };
        run().into()
    }

    pub fn show_role(&self, actor: UserId, id: RoleId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::ViewRoles)?;
            ApiResponse::data(200, self.system.role_entry(id)?)
        };
        run().into()
    }

    pub fn create_role(&self, actor: UserId, request: CreateRoleRequest) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::CreateRoles)?;
            let entry = self.system.create_role(
                &request.role_name,
                self.system.guard(),
                &as_strs(&request.permissions),
            )?;
            ApiResponse::data_with_message(201, "Role created successfully.", entry)
        };
        run().into()
    }

    pub fn update_role(&self, actor: UserId, id: RoleId, request: RoleUpdate) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::EditRoles)?;
            self.system.find_role(id)?;
            let entry = self.system.update_role(id, request)?;
            ApiResponse::data_with_message(200, "Role updated successfully.", entry)
        };
        run().into()
    }

    pub fn delete_role(&self, actor: UserId, id: RoleId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::DeleteRoles)?;
            self.system.find_role(id)?;
            self.system.delete_role(id)?;
            Ok(ApiResponse::message(200, "Role deleted successfully."))
        };
        run().into()
    }

    pub fn assign_permissions(
        &self,
        actor: UserId,
        id: RoleId,
        request: RolePermissionsRequest,
    ) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::AssignPermissions)?;
            self.system.find_role(id)?;
            self.system
                .assign_permissions_to_role(id, &as_strs(&request.permissions))?;
            ApiResponse::data_with_message(
                200,
                "Permissions assigned successfully.",
                self.system.role_entry(id)?,
            )
        };
        run().into()
    }

    pub fn revoke_permissions(
        &self,
        actor: UserId,
        id: RoleId,
        request: RolePermissionsRequest,
    ) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::RevokePermissions)?;
            self.system.find_role(id)?;
            self.system
                .revoke_permissions_from_role(id, &as_strs(&request.permissions))?;
            ApiResponse::data_with_message(
                200,
                "Permissions revoked successfully.",
                self.system.role_entry(id)?,
            )
        };
        run().into()
    }

    // Permissions

    pub fn list_permissions(&self, actor: UserId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::ViewPermissions)?;
            ApiResponse::data(200, self.system.list_permissions(true)?)
        };
        run().into()
    }

    pub fn show_permission(&self, actor: UserId, id: PermissionId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::ViewPermissions)?;
            ApiResponse::data(200, self.system.find_permission(id)?)
        };
        run().into()
    }

    pub fn create_permission(&self, actor: UserId, request: PermissionRequest) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::CreatePermissions)?;
            let permission = self
                .system
                .create_permission(&request.name, self.system.guard())?;
            ApiResponse::data_with_message(201, "Permission created successfully.", permission)
        };
        run().into()
    }

    /// Rename a permission. Answers 403 for any permission a role or user
    /// references, which under the default super-admin policy is every
    /// permission in the system guard once `super-admin` exists.
    pub fn update_permission(
        &self,
        actor: UserId,
        id: PermissionId,
        request: PermissionRequest,
    ) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::UpdatePermissions)?;
            self.system.find_permission(id)?;
            let permission = self.system.rename_permission(id, &request.name)?;
            ApiResponse::data_with_message(200, "Permission updated successfully.", permission)
        };
        run().into()
    }

    pub fn delete_permission(&self, actor: UserId, id: PermissionId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::DeletePermissions)?;
            self.system.find_permission(id)?;
            self.system.delete_permission(id)?;
            Ok(ApiResponse::message(200, "Permission deleted successfully."))
        };
        run().into()
    }

    // Users

    pub fn list_users(&self, actor: UserId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::ViewUsers)?;
            ApiResponse::data(200, self.system.list_users()?)
        };
        run().into()
    }

    pub fn show_user(&self, actor: UserId, id: UserId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::ViewUsers)?;
            ApiResponse::data(200, self.system.user_entry(id)?)
        };
        run().into()
    }

    pub fn create_user(&self, actor: UserId, request: CreateUserRequest) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::CreateUsers)?;
            validate_password(&request.password)?;
            let hash = self.hasher.hash(&request.password)?;
            let user = self.system.create_user(
                NewUser::new(request.name, request.email, hash).roles(request.roles),
            )?;
            ApiResponse::data_with_message(
                201,
                "User created successfully.",
                self.system.user_entry(user.id())?,
            )
        };
        run().into()
    }

    pub fn update_user(&self, actor: UserId, id: UserId, request: UserUpdate) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::EditUsers)?;
            self.system.find_user(id)?;
            self.system.update_user(id, request)?;
            ApiResponse::data_with_message(
                200,
                "User updated successfully.",
                self.system.user_entry(id)?,
            )
        };
        run().into()
    }

    pub fn delete_user(&self, actor: UserId, id: UserId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::DeleteUsers)?;
            self.system.find_user(id)?;
            self.system.delete_user(id)?;
            Ok(ApiResponse::message(200, "User deleted successfully."))
        };
        run().into()
    }

    // Products

    pub fn list_products(&self, actor: UserId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::ViewProduct)?;
            ApiResponse::data(200, self.system.list_products()?)
        };
        run().into()
    }

    pub fn show_product(&self, actor: UserId, id: ProductId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::ViewProduct)?;
            ApiResponse::data(200, self.system.find_product(id)?)
        };
        run().into()
    }

    pub fn create_product(&self, actor: UserId, request: ProductDraft) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::CreateProduct)?;
            let product = self.system.create_product(request)?;
            ApiResponse::data_with_message(201, "Product created successfully.", product)
        };
        run().into()
    }

    pub fn update_product(&self, actor: UserId, id: ProductId, request: ProductDraft) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::EditProduct)?;
            self.system.find_product(id)?;
            let product = self.system.update_product(id, request)?;
            ApiResponse::data_with_message(200, "Product updated successfully.", product)
        };
        run().into()
    }

    pub fn delete_product(&self, actor: UserId, id: ProductId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            self.authorize(actor, Ability::DeleteProduct)?;
            self.system.find_product(id)?;
            self.system.delete_product(id)?;
            Ok(ApiResponse::message(200, "Product deleted successfully."))
        };
        run().into()
    }

    // Accounts

    /// Self-service sign-up. The new account holds no roles.
    pub fn register(&self, request: RegisterRequest) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            validate_password(&request.password)?;
            if request.password != request.password_confirmation {
                return Err(Error::Validation(
                    "password confirmation does not match".to_string(),
                ));
            }
            let hash = self.hasher.hash(&request.password)?;
            let user = self
                .system
                .create_user(NewUser::new(request.name, request.email, hash))?;
            ApiResponse::data(201, self.system.user_entry(user.id())?)
        };
        run().into()
    }

    /// Check credentials and return the profile. Token issuance is left to
    /// the identity layer.
    pub fn login(&self, request: LoginRequest) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            let user = match self.system.find_user_by_email(&request.email) {
                Ok(user) if self.hasher.verify(&request.password, user.credential_hash()) => user,
                Ok(_) | Err(Error::UserNotFound(_)) => {
                    return Ok(ApiResponse::message(401, "Unauthorized"));
                }
                Err(e) => return Err(e),
            };
            ApiResponse::data(
                200,
                Profile {
                    user: self.system.user_entry(user.id())?,
                },
            )
        };
        run().into()
    }

    /// Profile of the authenticated actor, with roles and effective permissions.
    pub fn me(&self, actor: UserId) -> ApiResponse {
        let run = || -> Result<ApiResponse> {
            ApiResponse::data(
                200,
                Profile {
                    user: self.system.user_entry(actor)?,
                },
            )
        };
        run().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let denied = ApiResponse::from_error(&Error::PermissionDenied("edit-roles".into()));
        assert_eq!(denied.status, 403);
        assert_eq!(denied.body["message"], DENIED_MESSAGE);
        assert_eq!(denied.body["success"], false);

        let protected = ApiResponse::from_error(&Error::ProtectedEntity("super-admin".into()));
        assert_eq!(protected.status, 403);

        let internal = ApiResponse::from_error(&Error::Storage("disk full at /var/db".into()));
        assert_eq!(internal.status, 500);
        assert_eq!(internal.body["message"], INTERNAL_MESSAGE);

        assert_eq!(ApiResponse::from_error(&Error::RoleNotFound("7".into())).status, 404);
        assert_eq!(ApiResponse::from_error(&Error::Validation("x".into())).status, 422);
        assert_eq!(ApiResponse::from_error(&Error::UserAlreadyExists("a@b.c".into())).status, 409);
    }

    #[test]
    fn test_envelopes() {
        let ok = ApiResponse::data(200, vec![1, 2]).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.body, json!({ "success": true, "data": [1, 2] }));

        let message = ApiResponse::message(200, "done");
        assert_eq!(message.body["success"], true);
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }
}
