//! Error types for record construction and the merge/split engine.

use thiserror::Error;

/// Structural errors raised by records.
///
/// These are programming or configuration errors: they are returned
/// synchronously from the call that violates the invariant.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The record variant needs a different number of backing paths
    #[error("{record} must have {expected} path(s), but we got {actual}")]
    PathCount {
        record: &'static str,
        expected: &'static str,
        actual: usize,
    },

    /// The record variant needs a different number of fields
    #[error("{record} must have {expected} field(s), but we found {actual}")]
    FieldCount {
        record: &'static str,
        expected: &'static str,
        actual: usize,
    },

    /// A merge or iterate call got the wrong number of snapshots
    #[error("{record} must have exactly {expected} snapshot(s), but we got {actual}")]
    SnapshotCount {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Multi-location writes take an object keyed by logical field name
    #[error("Writes to a record spanning several fields require an object, got {found}")]
    ObjectRequired { found: String },

    /// Updates merge children, so they need an object
    #[error("update() requires an object, got {found}")]
    UpdateRequiresObject { found: String },

    /// The field exposes a location identifier, which cannot be written
    #[error("Field '{field}' is read-only")]
    ReadOnlyField { field: String },
}

impl RecordError {
    /// Check if this error reports a path/field/snapshot count mismatch
    pub fn is_count_mismatch(&self) -> bool {
        matches!(
            self,
            RecordError::PathCount { .. }
                | RecordError::FieldCount { .. }
                | RecordError::SnapshotCount { .. }
        )
    }

    /// Check if this error rejects the shape of data passed to a write
    pub fn is_write_error(&self) -> bool {
        matches!(
            self,
            RecordError::ObjectRequired { .. }
                | RecordError::UpdateRequiresObject { .. }
                | RecordError::ReadOnlyField { .. }
        )
    }
}

impl From<RecordError> for crate::Error {
    fn from(err: RecordError) -> Self {
        crate::Error::Record(err)
    }
}

/// Short description of a JSON value's type for error messages.
pub(crate) fn describe(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
    .to_string()
}
