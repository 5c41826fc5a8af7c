//! Error types for the access control core.

use thiserror::Error;

/// The main error type for rbac operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Permission with the given name already exists in the guard.
    #[error("Permission '{name}' already exists for guard '{guard}'")]
    PermissionAlreadyExists { name: String, guard: String },

    /// Role with the given name already exists in the guard.
    #[error("Role '{name}' already exists for guard '{guard}'")]
    RoleAlreadyExists { name: String, guard: String },

    /// A user is already registered with this email.
    #[error("User with email '{0}' already exists")]
    UserAlreadyExists(String),

    /// Permission id or name does not resolve.
    #[error("Permission '{0}' not found")]
    PermissionNotFound(String),

    /// Role id or name does not resolve.
    #[error("Role '{0}' not found")]
    RoleNotFound(String),

    /// User id or email does not resolve.
    #[error("User '{0}' not found")]
    UserNotFound(String),

    /// Product id does not resolve.
    #[error("Product '{0}' not found")]
    ProductNotFound(String),

    /// Authorization was denied for the requested operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The target is exempt from the requested change (super-admin role and its holders).
    #[error("Protected entity: {0}")]
    ProtectedEntity(String),

    /// Malformed input rejected before touching the graph.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage operation failed; the enclosing transaction was rolled back.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Outcome classes exposed to the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    Forbidden,
    ValidationFailed,
    InternalError,
}

impl ErrorKind {
    /// HTTP status used for this kind of failure.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::AlreadyExists => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::ValidationFailed => 422,
            ErrorKind::InternalError => 500,
        }
    }

    /// Stable label, used as the metrics key.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PermissionAlreadyExists { .. }
            | Error::RoleAlreadyExists { .. }
            | Error::UserAlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::PermissionNotFound(_)
            | Error::RoleNotFound(_)
            | Error::UserNotFound(_)
            | Error::ProductNotFound(_) => ErrorKind::NotFound,
            Error::PermissionDenied(_) | Error::ProtectedEntity(_) => ErrorKind::Forbidden,
            Error::Validation(_) => ErrorKind::ValidationFailed,
            Error::Storage(_) | Error::Serialization(_) | Error::InvalidConfiguration(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// Shorthand for `self.kind() == ErrorKind::NotFound`.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Shorthand for `self.kind() == ErrorKind::Forbidden`.
    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }
}

/// Result type alias for rbac operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_map_to_status_codes() {
        let cases = [
            (Error::RoleAlreadyExists { name: "viewer".into(), guard: "api".into() }, 409),
            (Error::UserNotFound("7".into()), 404),
            (Error::ProtectedEntity("super-admin".into()), 403),
            (Error::PermissionDenied("edit-roles".into()), 403),
            (Error::Validation("empty name".into()), 422),
            (Error::Storage("lock poisoned".into()), 500),
        ];

        for (error, status) in cases {
            assert_eq!(error.kind().status_code(), status, "{error}");
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::PermissionAlreadyExists {
            name: "view-product".into(),
            guard: "api".into(),
        };
        assert_eq!(
            err.to_string(),
            "Permission 'view-product' already exists for guard 'api'"
        );
        assert!(Error::RoleNotFound("x".into()).is_not_found());
        assert!(Error::ProtectedEntity("x".into()).is_forbidden());
    }
}
