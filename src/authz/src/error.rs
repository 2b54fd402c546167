//! Error types for the RBAC engine

use thiserror::Error;

/// Boxed error produced by a repository backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Authorization engine errors
///
/// A denied permission is never an error; it is `Ok(false)`.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// No checker has been attached to the permission service
    #[error("Configuration error: checker not configured")]
    CheckerNotConfigured,

    /// Invalid service configuration
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// Malformed permission string
    #[error("Invalid permission '{permission}': {reason}")]
    InvalidPermission {
        permission: String,
        reason: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Repository I/O failure
    #[error("Repository error: {context}")]
    Repository {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Role not found in the repository
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Attempt to delete a system role
    #[error("System role cannot be deleted: {0}")]
    SystemRole(String),

    /// Repository I/O was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Initialization defect (checker missing, bad config)
    Configuration,
    /// Data source failure
    Repository,
    /// Malformed caller input
    Validation,
    /// Cancelled during repository I/O
    Cancelled,
    /// Everything else
    Internal,
}

impl AuthzError {
    /// Wrap a repository failure with the operation that triggered it
    pub fn repository(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Repository {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn invalid_permission(permission: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPermission {
            permission: permission.to_string(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CheckerNotConfigured | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::InvalidPermission { .. } | Self::InvalidInput(_) => ErrorKind::Validation,
            Self::Repository { .. } | Self::RoleNotFound(_) | Self::SystemRole(_) => {
                ErrorKind::Repository
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_repository(&self) -> bool {
        self.kind() == ErrorKind::Repository
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
