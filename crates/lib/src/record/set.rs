//! Records joined from several fields, possibly across several locations.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::write::WriteBatch;
use super::{FieldKeys, RecordError, RecordField, SaveOptions, check_snapshots};
use crate::Result;
use crate::constants::PRIORITY_KEY;
use crate::field_map::{FieldEntry, FieldMap, PhysicalKey};
use crate::path::{Path, PathManager};
use crate::store::Snapshot;

const RECORD: &str = "RecordSet";

/// What one backing location receives from a logical write.
enum PathWrite {
    /// Individual children, written with `update`
    Children(Map<String, Value>),
    /// The whole location, written with `set`
    Whole(Value),
}

/// Writes collected for one backing location before they are resolved into
/// a single [`PathWrite`].
#[derive(Default)]
struct PathPlan {
    /// The `$value` write and whether the caller supplied it
    whole: Option<(Value, bool)>,
    /// Child writes in declaration order, including cleared ones
    children: Map<String, Value>,
    /// Children the caller named explicitly
    supplied: HashSet<String>,
}

impl PathPlan {
    fn whole(&mut self, value: Value, supplied: bool) {
        if !matches!(self.whole, Some((_, true))) || supplied {
            self.whole = Some((value, supplied));
        }
    }

    fn child(&mut self, name: &str, value: Value, supplied: bool) {
        if supplied {
            self.supplied.insert(name.to_string());
        } else if self.supplied.contains(name) {
            return;
        }
        self.children.insert(name.to_string(), value);
    }

    /// Explicitly written children always survive: a cleared `$value` yields
    /// to them, and a supplied object `$value` absorbs them.
    fn finish(self) -> Option<PathWrite> {
        let PathPlan {
            whole,
            mut children,
            supplied,
        } = self;
        match whole {
            None if children.is_empty() => None,
            None => Some(PathWrite::Children(children)),
            Some((_, false)) if !supplied.is_empty() => Some(PathWrite::Children(children)),
            Some((value, false)) => Some(PathWrite::Whole(value)),
            Some((value, true)) if supplied.is_empty() => Some(PathWrite::Whole(value)),
            Some((value, true)) => {
                let mut object = match value {
                    Value::Object(object) => object,
                    Value::Null => Map::new(),
                    scalar => {
                        tracing::warn!(
                            children = supplied.len(),
                            "Child writes shadowed by a scalar whole-location write"
                        );
                        return Some(PathWrite::Whole(scalar));
                    }
                };
                for (name, value) in children.iter_mut() {
                    if supplied.contains(name) {
                        object.insert(name.clone(), std::mem::take(value));
                    }
                }
                Some(PathWrite::Whole(Value::Object(object)))
            }
        }
    }
}

/// A physical write to issue, in plan order.
enum PhysicalWrite {
    Set {
        value: Value,
        priority: Option<Value>,
    },
    Update(Map<String, Value>),
    Priority(Value),
}

/// A logical record merged from one or more locations.
///
/// Snapshots passed to the merge and iterate operations are positional: the
/// `i`-th snapshot is the read of the `i`-th path of the record's
/// [`PathManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    map: FieldMap,
}

impl RecordSet {
    /// # Errors
    /// Fails if `map` has no fields.
    pub fn new(map: FieldMap) -> std::result::Result<Self, RecordError> {
        if map.is_empty() {
            return Err(RecordError::FieldCount {
                record: RECORD,
                expected: "at least 1",
                actual: 0,
            });
        }
        Ok(Self { map })
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.map
    }

    fn paths(&self) -> &PathManager {
        self.map.path_manager()
    }

    /// The single path's name, or `[a][b]` for several paths.
    pub fn name(&self) -> String {
        match self.paths().paths() {
            [only] => only.name(),
            many => many.iter().map(|p| format!("[{}]", p.name())).collect(),
        }
    }

    /// The single path's URL, or `[url1][url2]` for several paths.
    pub fn url(&self) -> String {
        match self.paths().paths() {
            [only] => only.url().to_string(),
            many => many.iter().map(|p| format!("[{}]", p.url())).collect(),
        }
    }

    /// Leaf record for the logical field `key`.
    ///
    /// Names that are not fields of this record descend the master path.
    pub fn child(&self, key: &str) -> Result<RecordField> {
        let (path, physical) = match self.map.get(key) {
            Some(entry) => match entry.physical() {
                PhysicalKey::Child(name) => (
                    Path::with_alias(entry.path().reference().child(name), key),
                    PhysicalKey::Value,
                ),
                marker => (
                    Path::with_alias(entry.path().reference().clone(), key),
                    marker.clone(),
                ),
            },
            None => (self.paths().master()?.child(key), PhysicalKey::Value),
        };
        let paths = PathManager::new(vec![path.clone()])?;
        let mut map = FieldMap::new(paths);
        map.add(&path, physical, key)?;
        Ok(RecordField::new(map)?)
    }

    fn resolve(entry: &FieldEntry, snap: &Snapshot, is_export: bool) -> Option<Value> {
        let value = match entry.physical() {
            PhysicalKey::Key => snap.key().map(|k| Value::String(k.to_string()))?,
            PhysicalKey::Value if is_export => snap.export_val(),
            PhysicalKey::Value => snap.val(),
            PhysicalKey::Child(name) => {
                let child = snap.child(name);
                if is_export {
                    child.export_val()
                } else {
                    child.val()
                }
            }
        };
        (!value.is_null()).then_some(value)
    }

    /// Combines per-location snapshots into one object keyed by logical name.
    ///
    /// Fields without data are left out; a record with no data at all merges
    /// to `null`. Exports carry the master location's priority.
    pub fn merge_data(&self, snaps: &[Snapshot], is_export: bool) -> Result<Value> {
        check_snapshots(RECORD, snaps, self.paths().count())?;
        let mut merged = Map::new();
        for entry in &self.map {
            if let Some(value) = Self::resolve(entry, &snaps[entry.path_index()], is_export) {
                merged.insert(entry.alias().to_string(), value);
            }
        }
        if merged.is_empty() {
            return Ok(Value::Null);
        }
        if is_export {
            let priority = self
                .paths()
                .master_index()
                .ok()
                .and_then(|i| snaps[i].priority().cloned());
            if let Some(priority) = priority {
                merged.insert(PRIORITY_KEY.to_string(), priority);
            }
        }
        Ok(Value::Object(merged))
    }

    /// The one snapshot backing the child record for `field_name`.
    pub fn get_child_snaps(&self, snaps: &[Snapshot], field_name: &str) -> Result<Vec<Snapshot>> {
        check_snapshots(RECORD, snaps, self.paths().count())?;
        let snap = match self.map.get(field_name) {
            Some(entry) => {
                let source = &snaps[entry.path_index()];
                match entry.physical() {
                    PhysicalKey::Child(name) => source.child(name),
                    _ => source.clone(),
                }
            }
            None => snaps[self.paths().master_index()?].child(field_name),
        };
        Ok(vec![snap])
    }

    /// Yields each logical name at most once, in declaration order, skipping
    /// fields whose child is absent from its own location's snapshot.
    pub fn keys<'a>(&'a self, snaps: &'a [Snapshot]) -> Result<FieldKeys<'a>> {
        check_snapshots(RECORD, snaps, self.paths().count())?;
        Ok(FieldKeys::logical(&self.map, snaps))
    }

    /// Splits a logical write into one physical write per affected location.
    ///
    /// A full write (`set`/`remove`) replaces every mapped slot and leaves
    /// unmapped children of the locations untouched; an update only touches
    /// the fields it names. Keys that are not fields go to the master path.
    /// Children written explicitly are never lost to a `$value` field on the
    /// same location, whatever the declaration order.
    pub fn save_data(&self, data: Value, options: SaveOptions) -> Result<()> {
        let SaveOptions {
            is_update,
            mut priority,
            callback,
        } = options;

        let mut values = match data {
            Value::Null => Map::new(),
            Value::Object(values) => values,
            other => {
                return Err(RecordError::ObjectRequired {
                    found: super::errors::describe(&other),
                }
                .into());
            }
        };
        if let Some(embedded) = values.shift_remove(PRIORITY_KEY) {
            priority.get_or_insert(embedded);
        }

        let paths = self.paths();
        let mut plan: Vec<PathPlan> = (0..paths.count()).map(|_| PathPlan::default()).collect();
        let mut mapped: HashSet<&str> = HashSet::new();

        for entry in &self.map {
            mapped.insert(entry.alias());
            let (value, supplied) = match values.get(entry.alias()) {
                Some(value) => (value.clone(), true),
                None if is_update => continue,
                None => (Value::Null, false),
            };
            let slot = &mut plan[entry.path_index()];
            match entry.physical() {
                PhysicalKey::Key => {
                    if !value.is_null() {
                        tracing::debug!(field = entry.alias(), "Ignoring write to key field");
                    }
                }
                PhysicalKey::Value => slot.whole(value, supplied),
                PhysicalKey::Child(name) => slot.child(name, value, supplied),
            }
        }

        let unmapped: Vec<(&String, &Value)> = values
            .iter()
            .filter(|(key, _)| !mapped.contains(key.as_str()))
            .collect();
        let master = if unmapped.is_empty() && priority.is_none() {
            paths.master_index().ok()
        } else {
            Some(paths.master_index()?)
        };
        if let Some(master) = master {
            for (key, value) in unmapped {
                tracing::warn!(%key, "Routing unmapped key to the master path");
                plan[master].child(key, value.clone(), true);
            }
        }
        let plan: Vec<Option<PathWrite>> = plan.into_iter().map(PathPlan::finish).collect();

        let mut writes: Vec<(&Path, PhysicalWrite)> = Vec::new();
        for (index, write) in plan.into_iter().enumerate() {
            let path = &paths.paths()[index];
            let is_master = master == Some(index);
            match write {
                Some(PathWrite::Whole(value)) => writes.push((
                    path,
                    PhysicalWrite::Set {
                        value,
                        priority: if is_master { priority.take() } else { None },
                    },
                )),
                Some(PathWrite::Children(children)) => {
                    writes.push((path, PhysicalWrite::Update(children)));
                }
                None => {}
            }
        }
        if let (Some(priority), Some(master)) = (priority, master) {
            writes.push((&paths.paths()[master], PhysicalWrite::Priority(priority)));
        }

        if writes.is_empty() {
            if let Some(callback) = callback {
                callback(Ok(()));
            }
            return Ok(());
        }

        tracing::debug!(record = %self.url(), writes = writes.len(), update = is_update, "Fanning out write");
        let batch = WriteBatch::new(writes.len(), callback);
        for (path, write) in writes {
            let done = Some(batch.completion(path.url().to_string()));
            let reference = path.reference();
            match write {
                PhysicalWrite::Set { value, priority } => reference.set(value, priority, done),
                PhysicalWrite::Update(children) => reference.update(children, done),
                PhysicalWrite::Priority(priority) => reference.set_priority(priority, done),
            }
        }
        Ok(())
    }
}
