//! # rbac-gate
//!
//! Role-based access control core for a small REST API with users, roles,
//! permissions and products.
//!
//! ## Features
//!
//! - Permission registry with names unique per guard
//! - Role store with atomic rename and permission sync
//! - User role assignments and direct permission grants
//! - Authorization by union of role-derived and direct permissions
//! - Process-wide permission cache, flushed on every graph mutation
//! - Protected `super-admin` role and accounts
//! - Framework-agnostic REST handlers that authorize before acting
//! - Audit logging of grants, denials and refused deletions
//! - Optional JSON file persistence and an async facade
//!
//! ## Quick Start
//!
//! ```rust
//! use rbac_gate::{Guard, NewUser, RoleSystem};
//!
//! let system = RoleSystem::new();
//! let api = Guard::default();
//!
//! // Register permissions and a role that groups them
//! system.create_permission("view-product", &api)?;
//! system.create_permission("edit-product", &api)?;
//! system.create_role("viewer", &api, &["view-product"])?;
//!
//! // Create a user holding the role
//! let user = system.create_user(NewUser::new("Ada", "ada@example.com", "<hash>").role("viewer"))?;
//!
//! assert!(system.authorize(user.id(), "view-product")?);
//! assert!(!system.authorize(user.id(), "edit-product")?);
//!
//! // Direct grants add to what roles give
//! system.give_permission_to_user(user.id(), "edit-product")?;
//! assert!(system.authorize(user.id(), "edit-product")?);
//! # Ok::<(), rbac_gate::Error>(())
//! ```
//!
//! ## Audit Logging
//!
//! When the `audit` feature is enabled, security events are logged through
//! the `log` facade. To enable logging:
//!
//! ```rust
//! use rbac_gate::init_audit_logger;
//!
//! // Initialize logging (must be called early in program execution)
//! init_audit_logger();
//!
//! // Configure log level through RUST_LOG environment variable:
//! // RUST_LOG=info,rbac_gate=debug
//! ```
//!
//! The following events are logged:
//! - Permission, role and user creation, updates and deletions
//! - Permission checks (granted at info, denied at warn)
//! - Refused deletions of protected entities
//! - Cache flushes (at debug level)

#[macro_use]
mod macros;

#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    let _ = env_logger::try_init();
}

pub mod api;
pub mod assignment;
pub mod cache;
pub mod catalog;
pub mod core;
pub mod error;
pub mod health;
pub mod metrics;
pub mod permission;
pub mod product;
pub mod role;
pub mod seed;
pub mod storage;
pub mod user;

#[cfg(feature = "async")]
pub mod async_support;

// Re-export main types for convenience
pub use crate::{
    api::{Api, ApiResponse, CredentialHasher},
    assignment::UserEntry,
    cache::PermissionCache,
    catalog::Ability,
    core::{
        AccessResult, PermissionEntry, RoleEntry, RoleSystem, RoleSystemConfig,
        RoleSystemConfigBuilder, SuperAdminPolicy,
    },
    error::{Error, ErrorKind, Result},
    permission::{Guard, Permission, PermissionId},
    product::{Product, ProductDraft, ProductId},
    role::{Role, RoleId, RoleUpdate, SUPER_ADMIN_ROLE},
    storage::{MemoryStorage, Storage},
    user::{NewUser, User, UserId, UserUpdate},
};

#[cfg(feature = "persistence")]
pub use crate::storage::FileStorage;

#[cfg(feature = "async")]
pub use crate::async_support::AsyncRoleSystem;
