//! Error types for collection configuration.

use thiserror::Error;

/// Configuration errors raised while building a normalized collection.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A collection needs at least one backing location
    #[error("A normalized collection needs at least one path")]
    NoPaths,

    /// A collection needs at least one selected field
    #[error("No fields selected; call select() with at least one field")]
    NoFields,
}

impl ConfigError {
    /// Check if this error reports a missing part of the configuration
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ConfigError::NoPaths | ConfigError::NoFields)
    }
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}
