//! Error types reported by the underlying real-time store.
//!
//! These errors are produced asynchronously: they reach callers through write
//! completions, authentication callbacks and listener cancellation, never as a
//! synchronous `Err` from a normalized reference.

use thiserror::Error;

/// Errors reported by a [`StoreRef`](super::StoreRef) implementation.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store rejected a write at this location
    #[error("Permission denied writing to '{path}'")]
    PermissionDenied { path: String },

    /// The store revoked read access to a location with active listeners
    #[error("Listener at '{path}' was cancelled: {reason}")]
    ListenerCancelled { path: String, reason: String },

    /// The store base URL could not be used to address locations
    #[error("Invalid store URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// An authentication request was rejected
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// Email/password pair did not match a registered user
    #[error("Invalid credentials for user '{email}'")]
    InvalidCredentials { email: String },

    /// A user with this email is already registered
    #[error("User '{email}' already exists")]
    UserExists { email: String },

    /// No user with this email is registered
    #[error("User '{email}' not found")]
    UserNotFound { email: String },
}

impl StoreError {
    /// Check if the store refused the operation for lack of permission
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            StoreError::PermissionDenied { .. } | StoreError::ListenerCancelled { .. }
        )
    }

    /// Check if this error came from an authentication or user-management call
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            StoreError::AuthenticationFailed { .. }
                | StoreError::InvalidCredentials { .. }
                | StoreError::UserExists { .. }
                | StoreError::UserNotFound { .. }
        )
    }

    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::UserNotFound { .. })
    }

    /// Get the location path associated with this error, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            StoreError::PermissionDenied { path } | StoreError::ListenerCancelled { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
