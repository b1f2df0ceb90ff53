//! Single-location, single-field records.

use serde_json::Value;

use super::{FieldKeys, RecordError, SaveOptions, check_snapshots};
use crate::Result;
use crate::field_map::{FieldEntry, FieldMap, PhysicalKey};
use crate::path::{Path, PathManager};
use crate::store::Snapshot;

const RECORD: &str = "RecordField";

/// A scalar leaf joined from exactly one location.
///
/// Having exactly one path and one field lets every operation skip the
/// general merge machinery: there is one snapshot and nothing to alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    map: FieldMap,
}

impl RecordField {
    /// # Errors
    /// Fails unless `map` has exactly one path and exactly one field.
    pub fn new(map: FieldMap) -> std::result::Result<Self, RecordError> {
        let paths = map.path_manager().count();
        if paths != 1 {
            return Err(RecordError::PathCount {
                record: RECORD,
                expected: "exactly 1",
                actual: paths,
            });
        }
        if map.len() != 1 {
            return Err(RecordError::FieldCount {
                record: RECORD,
                expected: "exactly 1",
                actual: map.len(),
            });
        }
        Ok(Self { map })
    }

    pub fn path(&self) -> &Path {
        self.map.path_manager().first()
    }

    /// The record's only field.
    pub fn entry(&self) -> &FieldEntry {
        &self.map.entries()[0]
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.map
    }

    /// Leaf for this location's `key` child, aliased to `key`.
    pub fn child(&self, key: &str) -> Result<RecordField> {
        let paths = PathManager::new(vec![self.path().child(key)])?;
        let path = paths.first().clone();
        let mut map = FieldMap::new(paths);
        map.add(&path, PhysicalKey::Value, key)?;
        Ok(RecordField::new(map)?)
    }

    /// The snapshot's value, or its export form with `is_export`.
    ///
    /// A `$key` leaf reads the location's identifier instead, so a child
    /// reference for a `$key` field reports the same value as that field in
    /// the parent record's merged object.
    pub fn merge_data(&self, snaps: &[Snapshot], is_export: bool) -> Result<Value> {
        check_snapshots(RECORD, snaps, 1)?;
        let snap = &snaps[0];
        Ok(match self.entry().physical() {
            PhysicalKey::Key => snap
                .key()
                .map_or(Value::Null, |key| Value::String(key.to_string())),
            _ if is_export => snap.export_val(),
            _ => snap.val(),
        })
    }

    pub fn get_child_snaps(&self, snaps: &[Snapshot], field_name: &str) -> Result<Vec<Snapshot>> {
        check_snapshots(RECORD, snaps, 1)?;
        Ok(vec![snaps[0].child(field_name)])
    }

    /// Yields the field's physical id if it is a reserved marker or present
    /// in the snapshot.
    pub fn keys<'a>(&'a self, snaps: &'a [Snapshot]) -> Result<FieldKeys<'a>> {
        check_snapshots(RECORD, snaps, 1)?;
        Ok(FieldKeys::physical(&self.map, snaps))
    }

    pub fn save_data(&self, data: Value, options: SaveOptions) -> Result<()> {
        let entry = self.entry();
        if *entry.physical() == PhysicalKey::Key {
            return Err(RecordError::ReadOnlyField {
                field: entry.alias().to_string(),
            }
            .into());
        }
        let reference = self.path().reference();
        tracing::debug!(url = self.path().url(), update = options.is_update, "Saving field");
        if options.is_update {
            match data {
                Value::Object(values) => reference.update(values, options.callback),
                other => {
                    return Err(RecordError::UpdateRequiresObject {
                        found: super::errors::describe(&other),
                    }
                    .into());
                }
            }
        } else {
            reference.set(data, options.priority, options.callback);
        }
        Ok(())
    }
}
