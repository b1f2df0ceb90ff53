//! Error types for path and path-set construction.

use thiserror::Error;

/// Structural errors raised while assembling the locations behind a record.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    /// A record needs at least one backing location
    #[error("At least one path is required")]
    Empty,

    /// Two paths point at the same location
    #[error("Duplicate path for location '{url}'")]
    DuplicateLocation { url: String },

    /// Two paths share an alias, so field selectors would be ambiguous
    #[error("Duplicate path alias '{alias}'")]
    DuplicateAlias { alias: String },

    /// More than one path was flagged as master
    #[error("Only one path may be master, but {count} were flagged")]
    MultipleMasters { count: usize },

    /// The master index does not name one of the paths
    #[error("Master index {index} is out of range for {count} paths")]
    MasterOutOfRange { index: usize, count: usize },

    /// A whole-store operation was requested on several paths with no master
    #[error("No master path designated among {count} paths; whole-store operations need one")]
    NoMaster { count: usize },
}

impl PathError {
    /// Check if this error concerns master designation
    pub fn is_master_error(&self) -> bool {
        matches!(
            self,
            PathError::MultipleMasters { .. }
                | PathError::MasterOutOfRange { .. }
                | PathError::NoMaster { .. }
        )
    }

    /// Check if this error rejects a duplicate location or alias
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            PathError::DuplicateLocation { .. } | PathError::DuplicateAlias { .. }
        )
    }
}

impl From<PathError> for crate::Error {
    fn from(err: PathError) -> Self {
        crate::Error::Path(err)
    }
}
