//! Error types for normalized reference operations.

use thiserror::Error;

/// Errors raised synchronously by [`NormalizedRef`](super::NormalizedRef).
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// The operation needs single-location atomicity
    #[error(
        "{operation} is not supported for normalized references. Try calling it on the original reference used to create the collection instead."
    )]
    Unsupported { operation: &'static str },

    /// `child` was called with a path that has no segments
    #[error("Child path '{path}' contains no segments")]
    EmptyPath { path: String },

    /// The master location did not hand out a push id
    #[error("Location '{url}' did not produce a push id")]
    MissingPushId { url: String },

    /// An awaited write was abandoned by the store before it completed
    #[error("Write to '{url}' was dropped before completing")]
    CompletionDropped { url: String },
}

impl ReferenceError {
    /// Check if this error rejects an operation normalized references cannot
    /// perform
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ReferenceError::Unsupported { .. })
    }

    /// Get the name of the unsupported operation, if any
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            ReferenceError::Unsupported { operation } => Some(operation),
            _ => None,
        }
    }
}

impl From<ReferenceError> for crate::Error {
    fn from(err: ReferenceError) -> Self {
        crate::Error::Reference(err)
    }
}
