//! User accounts that roles and direct permissions attach to.

use crate::error::{Error, Result};
use crate::permission::validate_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

entity_id! {
    /// Identifier of a user record.
    UserId
}

/// A user account. Role and permission links live in the edge sets.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    name: String,
    email: String,
    credential_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn new(id: UserId, name: String, email: String, credential_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            email,
            credential_hash,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get the user's unique identifier.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Get the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Get the opaque credential hash produced by the hashing collaborator.
    pub fn credential_hash(&self) -> &str {
        &self.credential_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
        self.updated_at = Utc::now();
    }

    pub(crate) fn set_email(&mut self, email: String) {
        self.email = email;
        self.updated_at = Utc::now();
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("credential_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}> (user:{})", self.name, self.email, self.id)
    }
}

/// Input for `RoleSystem::create_user`.
#[derive(Clone, Default)]
pub struct NewUser {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) credential_hash: String,
    pub(crate) roles: Vec<String>,
}

impl NewUser {
    /// Start a new user with the required fields.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        credential_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            credential_hash: credential_hash.into(),
            roles: Vec::new(),
        }
    }

    /// Add an initial role by name.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add several initial roles by name.
    pub fn roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_name("user", &self.name)?;
        validate_email(&self.email)?;
        if self.credential_hash.is_empty() {
            return Err(Error::Validation("credential hash cannot be empty".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Changes applied by `RoleSystem::update_user`.
///
/// `roles`, when present, replaces the user's role set exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Option<Vec<String>>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
pub(crate) fn validate_email(email: &str) -> Result<()> {
    let invalid = || Error::Validation(format!("invalid email address: '{email}'"));

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    Ok(())
}
