//! Permission definitions and name validation.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

entity_id! {
    /// Identifier of a permission record.
    PermissionId
}

/// Guard name used when none is given.
pub const DEFAULT_GUARD: &str = "api";

/// A namespace separating permission and role sets of different
/// authentication contexts. Names are unique only within a guard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guard(String);

impl Guard {
    /// Create a guard, rejecting malformed names.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("guard", &name)?;
        Ok(Self(name))
    }

    /// The guard name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self(DEFAULT_GUARD.to_string())
    }
}

impl std::fmt::Display for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Guard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A named permission. Identity is `(name, guard)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    id: PermissionId,
    name: String,
    guard: Guard,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Permission {
    pub(crate) fn new(id: PermissionId, name: String, guard: Guard) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            guard,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get the permission's identifier.
    pub fn id(&self) -> PermissionId {
        self.id
    }

    /// Get the permission name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the guard this permission belongs to.
    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Check whether this permission is identified by `name` under `guard`.
    pub fn matches(&self, name: &str, guard: &Guard) -> bool {
        self.name == name && &self.guard == guard
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
        self.updated_at = Utc::now();
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.guard, self.name)
    }
}

/// Reject names that are empty, padded with whitespace, or contain
/// control characters.
pub(crate) fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation(format!("{what} name cannot be empty")));
    }

    if name.trim() != name {
        return Err(Error::Validation(format!(
            "{what} name cannot start or end with whitespace: '{name}'"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(Error::Validation(format!(
            "{what} name cannot contain control characters"
        )));
    }

    if name.chars().count() > 255 {
        return Err(Error::Validation(format!(
            "{what} name cannot be longer than 255 characters"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_creation() {
        let permission = Permission::new(PermissionId(1), "view-product".into(), Guard::default());
        assert_eq!(permission.id(), PermissionId(1));
        assert_eq!(permission.name(), "view-product");
        assert_eq!(permission.guard().as_str(), "api");
        assert_eq!(permission.to_string(), "api:view-product");
    }

    #[test]
    fn test_permission_matching_is_guard_scoped() {
        let web = Guard::new("web").unwrap();
        let permission = Permission::new(PermissionId(1), "view-product".into(), Guard::default());
        assert!(permission.matches("view-product", &Guard::default()));
        assert!(!permission.matches("view-product", &web));
        assert!(!permission.matches("edit-product", &Guard::default()));
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("permission", "edit-product").is_ok());
        assert!(validate_name("permission", "").is_err());
        assert!(validate_name("permission", "   ").is_err());
        assert!(validate_name("permission", " edit").is_err());
        assert!(validate_name("permission", "edit\0product").is_err());
        assert!(validate_name("permission", &"x".repeat(256)).is_err());
    }

    #[test]
    fn test_guard_parsing() {
        let guard: Guard = "web".parse().unwrap();
        assert_eq!(guard.as_str(), "web");
        assert!("".parse::<Guard>().is_err());
        assert_eq!(Guard::default().as_str(), DEFAULT_GUARD);
    }

    #[test]
    fn test_permission_id_serializes_as_integer() {
        let json = serde_json::to_string(&PermissionId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
