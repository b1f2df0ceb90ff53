//! Error types for field map construction.

use thiserror::Error;

/// Configuration errors in the mapping from logical names to physical slots.
///
/// All of these surface while the map is being built, never at merge time.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldMapError {
    /// Two fields were given the same logical name
    #[error("Duplicate field alias '{alias}'")]
    DuplicateAlias { alias: String },

    /// Logical names must be non-empty
    #[error("Field alias must not be empty")]
    EmptyAlias,

    /// The field refers to a path outside this map's path set
    #[error("Path '{path}' is not part of this field map")]
    UnknownPath { path: String },

    /// A textual field selector could not be parsed
    #[error("Invalid field selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

impl FieldMapError {
    /// Check if this error is an alias collision
    pub fn is_duplicate_alias(&self) -> bool {
        matches!(self, FieldMapError::DuplicateAlias { .. })
    }

    /// Get the offending alias, if any
    pub fn alias(&self) -> Option<&str> {
        match self {
            FieldMapError::DuplicateAlias { alias } => Some(alias),
            _ => None,
        }
    }
}

impl From<FieldMapError> for crate::Error {
    fn from(err: FieldMapError) -> Self {
        crate::Error::FieldMap(err)
    }
}
