//! Mapping from logical field names to physical slots.
//!
//! A [`FieldMap`] is the ordered, alias-unique list of fields one record
//! exposes. Each entry resolves a logical name to a `(path, physical key)`
//! pair, where the physical key is either a child name at that path or one of
//! the reserved markers [`KEY_MARKER`] and [`VALUE_MARKER`].
//!
//! Declaration order is significant: merged values and key iteration follow it.

use std::collections::HashMap;
use std::fmt;

use crate::constants::{ALIAS_KEYWORD, KEY_MARKER, VALUE_MARKER};
use crate::path::{Path, PathManager};

mod errors;
pub use errors::FieldMapError;

/// How a field addresses data at its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalKey {
    /// The location's identifier is the value
    Key,
    /// The location's own content is the value
    Value,
    /// A named child of the location
    Child(String),
}

impl PhysicalKey {
    /// Interprets `$key`/`$value` as markers and anything else as a child name.
    pub fn parse(raw: &str) -> Self {
        match raw {
            KEY_MARKER => PhysicalKey::Key,
            VALUE_MARKER => PhysicalKey::Value,
            other => PhysicalKey::Child(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PhysicalKey::Key => KEY_MARKER,
            PhysicalKey::Value => VALUE_MARKER,
            PhysicalKey::Child(name) => name,
        }
    }

    pub fn is_reserved(&self) -> bool {
        !matches!(self, PhysicalKey::Child(_))
    }
}

impl fmt::Display for PhysicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one physical slot: a location plus a physical key.
///
/// Reserved markers never compare equal to a literal child name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    url: String,
    physical: PhysicalKey,
}

impl FieldKey {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn physical(&self) -> &PhysicalKey {
        &self.physical
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.url, self.physical)
    }
}

/// One logical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    alias: String,
    path: Path,
    path_index: usize,
    physical: PhysicalKey,
}

impl FieldEntry {
    /// The logical name.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position of this field's path in the owning [`PathManager`].
    pub fn path_index(&self) -> usize {
        self.path_index
    }

    pub fn physical(&self) -> &PhysicalKey {
        &self.physical
    }

    /// The physical key as a string: a child name, `$key` or `$value`.
    pub fn id(&self) -> &str {
        self.physical.as_str()
    }

    pub fn key(&self) -> FieldKey {
        FieldMap::key(&self.path, &self.physical)
    }
}

/// Ordered, alias-unique fields over one [`PathManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    paths: PathManager,
    fields: Vec<FieldEntry>,
    by_alias: HashMap<String, usize>,
}

impl FieldMap {
    pub fn new(paths: PathManager) -> Self {
        Self {
            paths,
            fields: Vec::new(),
            by_alias: HashMap::new(),
        }
    }

    /// Canonical identity of the slot `physical` at `path`.
    pub fn key(path: &Path, physical: &PhysicalKey) -> FieldKey {
        FieldKey {
            url: path.url().to_string(),
            physical: physical.clone(),
        }
    }

    /// Appends a field named `alias` reading `physical` at `path`.
    ///
    /// # Errors
    /// Fails if `alias` is empty or already taken, or if `path` is not one of
    /// this map's paths.
    pub fn add(
        &mut self,
        path: &Path,
        physical: PhysicalKey,
        alias: impl Into<String>,
    ) -> Result<&FieldEntry, FieldMapError> {
        let alias = alias.into();
        if alias.is_empty() {
            return Err(FieldMapError::EmptyAlias);
        }
        if self.by_alias.contains_key(&alias) {
            return Err(FieldMapError::DuplicateAlias { alias });
        }
        let path_index = self
            .paths
            .index_of(path)
            .ok_or_else(|| FieldMapError::UnknownPath {
                path: path.url().to_string(),
            })?;

        let slot = Self::key(path, &physical);
        if let Some(existing) = self.find_key(&slot) {
            tracing::warn!(
                slot = %slot,
                existing = existing.alias(),
                %alias,
                "Two fields map onto the same physical slot"
            );
        }

        self.by_alias.insert(alias.clone(), self.fields.len());
        self.fields.push(FieldEntry {
            alias,
            path: self.paths.paths()[path_index].clone(),
            path_index,
            physical,
        });
        Ok(&self.fields[self.fields.len() - 1])
    }

    /// Parses and appends a field selector.
    ///
    /// The grammar is `<path>.<physical key>[ as <logical name>]`, where
    /// `<path>` is a path alias or key. With a single path the `<path>.`
    /// prefix may be omitted. The logical name defaults to the child name, or
    /// to the path's name for the `$key`/`$value` markers.
    pub fn add_selector(&mut self, selector: &str) -> Result<&FieldEntry, FieldMapError> {
        let invalid = |reason: &str| FieldMapError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        };

        let (target, alias) = match selector.split_once(ALIAS_KEYWORD) {
            Some((target, alias)) => (target.trim(), Some(alias.trim())),
            None => (selector.trim(), None),
        };
        if target.is_empty() {
            return Err(invalid("missing field"));
        }

        let (path, raw_key) = match target.split_once('.') {
            Some((name, raw_key)) => {
                let (_, path) = self
                    .paths
                    .find(name)
                    .ok_or_else(|| invalid("unknown path"))?;
                (path.clone(), raw_key)
            }
            None if self.paths.count() == 1 => (self.paths.first().clone(), target),
            None => return Err(invalid("expected <path>.<field> with several paths")),
        };
        if raw_key.is_empty() {
            return Err(invalid("missing field"));
        }

        let physical = PhysicalKey::parse(raw_key);
        let alias = match (alias, &physical) {
            (Some(alias), _) => alias.to_string(),
            (None, PhysicalKey::Child(name)) => name.clone(),
            (None, _) => path.name(),
        };
        self.add(&path, physical, alias)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, FieldEntry> {
        self.fields.iter()
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.fields
    }

    pub fn first(&self) -> Option<&FieldEntry> {
        self.fields.first()
    }

    /// Looks up a field by logical name.
    pub fn get(&self, alias: &str) -> Option<&FieldEntry> {
        self.by_alias.get(alias).map(|&i| &self.fields[i])
    }

    /// Finds the first field reading the given physical slot.
    pub fn find_key(&self, key: &FieldKey) -> Option<&FieldEntry> {
        self.fields.iter().find(|f| f.key() == *key)
    }

    /// Fields backed by the `index`-th path, in declaration order.
    pub fn fields_for_path(&self, index: usize) -> impl Iterator<Item = &FieldEntry> {
        self.fields.iter().filter(move |f| f.path_index == index)
    }

    pub fn path_manager(&self) -> &PathManager {
        &self.paths
    }
}

impl<'a> IntoIterator for &'a FieldMap {
    type Item = &'a FieldEntry;
    type IntoIter = std::slice::Iter<'a, FieldEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
