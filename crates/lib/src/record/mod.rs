//! The merge/split engine behind normalized references.
//!
//! A [`Record`] owns one [`FieldMap`] (and through it one [`PathManager`]) and
//! knows how to:
//!
//! * merge per-location [`Snapshot`]s into one logical value,
//! * iterate logical field names in declaration order,
//! * derive child records for navigation,
//! * split one logical write into per-location writes.
//!
//! Records are a closed set of variants dispatched by tag:
//! [`RecordField`] for single-location scalar leaves and [`RecordSet`] for
//! joins over one or more locations. Both are immutable after construction.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::Result;
use crate::field_map::{FieldEntry, FieldMap, PhysicalKey};
use crate::path::{Path, PathManager};
use crate::store::{Completion, Snapshot};

mod errors;
pub use errors::RecordError;

mod field;
pub use field::RecordField;

mod set;
pub use set::RecordSet;

mod sync;
pub use sync::{MergeHandler, Synchronizer};

mod write;

/// How a write should be applied, and who hears about its outcome.
#[derive(Default)]
pub struct SaveOptions {
    /// Merge into the destination instead of overwriting it
    pub is_update: bool,
    /// Ordering priority to attach (applied to the master location)
    pub priority: Option<Value>,
    /// Fires once every constituent physical write has completed, or with the
    /// first failure
    pub callback: Option<Completion>,
}

impl SaveOptions {
    /// Options for an overwriting write.
    pub fn set() -> Self {
        Self::default()
    }

    /// Options for a merging write.
    pub fn update() -> Self {
        Self {
            is_update: true,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Value) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_callback(mut self, callback: Option<Completion>) -> Self {
        self.callback = callback;
        self
    }
}

impl fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOptions")
            .field("is_update", &self.is_update)
            .field("priority", &self.priority)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

pub(crate) fn check_snapshots(
    record: &'static str,
    snaps: &[Snapshot],
    expected: usize,
) -> std::result::Result<(), RecordError> {
    if snaps.len() != expected {
        return Err(RecordError::SnapshotCount {
            record,
            expected,
            actual: snaps.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyMode {
    /// Yield physical ids, checked against the single snapshot
    Physical,
    /// Yield logical names, checked against each field's own snapshot
    Logical,
}

/// Lazy traversal of the field names a record exposes for some snapshots.
///
/// The traversal is finite and follows declaration order; clone it or ask the
/// record again to restart.
#[derive(Debug, Clone)]
pub struct FieldKeys<'a> {
    fields: std::slice::Iter<'a, FieldEntry>,
    snaps: &'a [Snapshot],
    mode: KeyMode,
    seen: HashSet<&'a str>,
}

impl<'a> FieldKeys<'a> {
    fn physical(map: &'a FieldMap, snaps: &'a [Snapshot]) -> Self {
        Self::new(map, snaps, KeyMode::Physical)
    }

    fn logical(map: &'a FieldMap, snaps: &'a [Snapshot]) -> Self {
        Self::new(map, snaps, KeyMode::Logical)
    }

    fn new(map: &'a FieldMap, snaps: &'a [Snapshot], mode: KeyMode) -> Self {
        Self {
            fields: map.entries().iter(),
            snaps,
            mode,
            seen: HashSet::new(),
        }
    }
}

impl<'a> Iterator for FieldKeys<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        for field in self.fields.by_ref() {
            let snap = match self.mode {
                KeyMode::Physical => &self.snaps[0],
                KeyMode::Logical => &self.snaps[field.path_index()],
            };
            let present = match field.physical() {
                PhysicalKey::Child(name) => snap.has_child(name),
                // A merged view leaves out the key of the store root, which
                // has none; a leaf yields its markers unconditionally.
                PhysicalKey::Key => self.mode == KeyMode::Physical || snap.key().is_some(),
                PhysicalKey::Value => true,
            };
            if !present {
                continue;
            }
            let name = match self.mode {
                KeyMode::Physical => field.id(),
                KeyMode::Logical => field.alias(),
            };
            if self.seen.insert(name) {
                return Some(name);
            }
        }
        None
    }
}

/// One logical view over one or more locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Field(RecordField),
    Set(RecordSet),
}

impl Record {
    /// Builds a single-location leaf; see [`RecordField::new`].
    pub fn field(map: FieldMap) -> Result<Self> {
        Ok(Record::Field(RecordField::new(map)?))
    }

    /// Builds a join; see [`RecordSet::new`].
    pub fn set(map: FieldMap) -> Result<Self> {
        Ok(Record::Set(RecordSet::new(map)?))
    }

    /// Variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Field(_) => "RecordField",
            Record::Set(_) => "RecordSet",
        }
    }

    pub fn field_map(&self) -> &FieldMap {
        match self {
            Record::Field(field) => field.field_map(),
            Record::Set(set) => set.field_map(),
        }
    }

    pub fn path_manager(&self) -> &PathManager {
        self.field_map().path_manager()
    }

    pub fn paths(&self) -> &[Path] {
        self.path_manager().paths()
    }

    /// The path that receives whole-store operations.
    pub fn master(&self) -> Result<&Path> {
        Ok(self.path_manager().master()?)
    }

    /// Name of the record's location.
    pub fn name(&self) -> String {
        match self {
            Record::Field(field) => field.path().name(),
            Record::Set(set) => set.name(),
        }
    }

    /// Canonical location URL of the record.
    pub fn url(&self) -> String {
        match self {
            Record::Field(field) => field.path().url().to_string(),
            Record::Set(set) => set.url(),
        }
    }

    /// Derives the record one level below, for the field or child `key`.
    pub fn child(&self, key: &str) -> Result<Record> {
        Ok(Record::Field(match self {
            Record::Field(field) => field.child(key)?,
            Record::Set(set) => set.child(key)?,
        }))
    }

    /// Merges one snapshot per path into the record's logical value.
    ///
    /// With `is_export` the value carries priority metadata.
    pub fn merge_data(&self, snaps: &[Snapshot], is_export: bool) -> Result<Value> {
        match self {
            Record::Field(field) => field.merge_data(snaps, is_export),
            Record::Set(set) => set.merge_data(snaps, is_export),
        }
    }

    /// Snapshots backing the child record for `field_name`, one per path of
    /// that child.
    pub fn get_child_snaps(&self, snaps: &[Snapshot], field_name: &str) -> Result<Vec<Snapshot>> {
        match self {
            Record::Field(field) => field.get_child_snaps(snaps, field_name),
            Record::Set(set) => set.get_child_snaps(snaps, field_name),
        }
    }

    /// The field names present in `snaps`, lazily, in declaration order.
    pub fn keys<'a>(&'a self, snaps: &'a [Snapshot]) -> Result<FieldKeys<'a>> {
        match self {
            Record::Field(field) => field.keys(snaps),
            Record::Set(set) => set.keys(snaps),
        }
    }

    /// Visits field names until `iterator` returns `true`.
    ///
    /// Returns `Ok(true)` when iteration was aborted.
    pub fn for_each_key(
        &self,
        snaps: &[Snapshot],
        mut iterator: impl FnMut(&str) -> bool,
    ) -> Result<bool> {
        Ok(self.keys(snaps)?.any(|key| iterator(key)))
    }

    /// Writes logical `data`; `Value::Null` removes.
    ///
    /// Structural problems are returned immediately; store failures reach
    /// `options.callback`.
    pub fn save_data(&self, data: Value, options: SaveOptions) -> Result<()> {
        match self {
            Record::Field(field) => field.save_data(data, options),
            Record::Set(set) => set.save_data(data, options),
        }
    }
}
