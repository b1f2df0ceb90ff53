//!
//! normref: normalized references over a real-time, tree-structured store.
//! This library joins data kept at several independent locations into one live
//! logical record with aliased field names.
//!
//! ## Core Concepts
//!
//! * **Paths (`path::Path`, `path::PathManager`)**: The locations backing one record, one of which is the master.
//! * **Field maps (`field_map::FieldMap`)**: Ordered logical field names, each resolved to a location and a physical key (`child`, `$key` or `$value`).
//! * **Records (`record::Record`)**: The merge/split engine. Merges per-location snapshots into one value and splits logical writes into per-location writes.
//!     * **RecordField (`record::RecordField`)**: A single-location scalar leaf.
//!     * **RecordSet (`record::RecordSet`)**: A join over one or more locations.
//! * **Synchronizer (`record::Synchronizer`)**: Subscribes to every location of a record and re-emits their latest snapshots together.
//! * **Normalized references (`reference::NormalizedRef`)**: The user-facing handle: navigation, writes, subscriptions and whole-store delegation.
//! * **Collections (`collection::NormalizedCollection`)**: Builders and serializable configuration for normalized references.
//! * **Stores (`store::StoreRef`)**: The contract consumed from the underlying store, plus an in-memory implementation (`store::MemoryStore`).

pub mod clock;
pub mod collection;
pub mod constants;
pub mod field_map;
pub mod path;
pub mod record;
pub mod reference;
pub mod store;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use collection::{CollectionConfig, NormalizedCollection, PathSpec};
pub use record::Record;
pub use reference::{NormalizedRef, NormalizedSnapshot};

/// Result type used throughout the normref library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the normref library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured path errors from the path module
    #[error(transparent)]
    Path(path::PathError),

    /// Structured field map errors from the field_map module
    #[error(transparent)]
    FieldMap(field_map::FieldMapError),

    /// Structured record errors from the record module
    #[error(transparent)]
    Record(record::RecordError),

    /// Structured reference errors from the reference module
    #[error(transparent)]
    Reference(reference::ReferenceError),

    /// Errors reported by the underlying store
    #[error(transparent)]
    Store(store::StoreError),

    /// Structured configuration errors from the collection module
    #[error(transparent)]
    Config(collection::ConfigError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Path(_) => "path",
            Error::FieldMap(_) => "field_map",
            Error::Record(_) => "record",
            Error::Reference(_) => "reference",
            Error::Store(_) => "store",
            Error::Config(_) => "collection",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error is a programming or configuration error raised
    /// synchronously by the call that violated an invariant.
    pub fn is_structural_error(&self) -> bool {
        matches!(
            self,
            Error::Path(_)
                | Error::FieldMap(_)
                | Error::Record(_)
                | Error::Config(_)
                | Error::Reference(reference::ReferenceError::EmptyPath { .. })
        )
    }

    /// Check if this error rejects an operation normalized references cannot
    /// perform.
    pub fn is_unsupported_operation(&self) -> bool {
        match self {
            Error::Reference(reference_err) => reference_err.is_unsupported(),
            _ => false,
        }
    }

    /// Check if this error indicates permission was denied.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_permission_denied(),
            _ => false,
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is authentication-related.
    pub fn is_authentication_error(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_authentication_error(),
            _ => false,
        }
    }

    /// Check if this error concerns master path designation.
    pub fn is_master_error(&self) -> bool {
        match self {
            Error::Path(path_err) => path_err.is_master_error(),
            _ => false,
        }
    }
}
