//! Merged point-in-time reads of a normalized reference.

use std::fmt;

use serde_json::Value;

use super::NormalizedRef;
use crate::Result;
use crate::constants::PATH_SEPARATOR;
use crate::record::Record;
use crate::store::Snapshot;

/// A read of every location behind a [`NormalizedRef`], merged into one value.
///
/// Keeps the per-location snapshots so that children can be derived the same
/// way references derive child records.
#[derive(Clone)]
pub struct NormalizedSnapshot {
    reference: NormalizedRef,
    snaps: Vec<Snapshot>,
    value: Value,
}

impl NormalizedSnapshot {
    pub(crate) fn new(reference: NormalizedRef, snaps: Vec<Snapshot>) -> Result<Self> {
        let value = reference.record().merge_data(&snaps, false)?;
        Ok(Self {
            reference,
            snaps,
            value,
        })
    }

    /// The merged logical value; `Value::Null` when no field has data.
    pub fn val(&self) -> Value {
        self.value.clone()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The merged value with priority metadata.
    pub fn export_val(&self) -> Value {
        self.reference
            .record()
            .merge_data(&self.snaps, true)
            .unwrap_or(Value::Null)
    }

    pub fn key(&self) -> String {
        self.reference.key()
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// The reference this snapshot was read from.
    pub fn reference(&self) -> &NormalizedRef {
        &self.reference
    }

    /// The raw per-location snapshots, in path order.
    pub fn sources(&self) -> &[Snapshot] {
        &self.snaps
    }

    /// Snapshot of the child at `path`, derived segment by segment.
    pub fn child(&self, path: &str) -> Result<NormalizedSnapshot> {
        let mut current = self.clone();
        let mut descended = false;
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            let snaps = current.reference.record().get_child_snaps(&current.snaps, segment)?;
            let reference = current.reference.child(segment)?;
            current = NormalizedSnapshot::new(reference, snaps)?;
            descended = true;
        }
        if !descended {
            return Err(super::ReferenceError::EmptyPath {
                path: path.to_string(),
            }
            .into());
        }
        Ok(current)
    }

    pub fn has_child(&self, path: &str) -> bool {
        self.child(path).is_ok_and(|child| child.exists())
    }

    /// Visits child snapshots until `action` returns `true`.
    ///
    /// Joined records visit their fields in declaration order; leaves visit
    /// the children of their location. Returns whether iteration was aborted.
    pub fn for_each(&self, mut action: impl FnMut(NormalizedSnapshot) -> bool) -> Result<bool> {
        let names: Vec<String> = match self.reference.record() {
            Record::Set(_) => self
                .reference
                .record()
                .keys(&self.snaps)?
                .map(str::to_string)
                .collect(),
            Record::Field(_) => self.snaps[0]
                .children()
                .filter_map(|child| child.key().map(str::to_string))
                .collect(),
        };
        for name in names {
            if action(self.child(&name)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn num_children(&self) -> usize {
        let mut count = 0;
        let counted = self.for_each(|_| {
            count += 1;
            false
        });
        if let Err(err) = counted {
            tracing::warn!(error = %err, "Failed to count children");
        }
        count
    }
}

impl fmt::Debug for NormalizedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedSnapshot")
            .field("url", &self.reference.url())
            .field("value", &self.value)
            .finish()
    }
}
