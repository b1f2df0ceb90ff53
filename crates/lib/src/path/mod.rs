//! Backing locations of a normalized record.
//!
//! A [`Path`] names one location of the underlying store, optionally under an
//! alias that field selectors refer to. A [`PathManager`] is the ordered set of
//! distinct paths behind one record, with at most one designated master that
//! whole-store operations are routed to.

use std::collections::HashSet;
use std::fmt;

use crate::store::SharedRef;

mod errors;
pub use errors::PathError;

/// One location of the underlying store, as used by a record.
///
/// Paths are cheap to clone and are shared by every record that reads the
/// same location; no record owns one exclusively.
#[derive(Clone)]
pub struct Path {
    reference: SharedRef,
    alias: Option<String>,
    url: String,
}

impl Path {
    /// Wraps a store location without an alias.
    pub fn new(reference: SharedRef) -> Self {
        let url = reference.url().to_string();
        Self {
            reference,
            alias: None,
            url,
        }
    }

    /// Wraps a store location under `alias`.
    pub fn with_alias(reference: SharedRef, alias: impl Into<String>) -> Self {
        let mut path = Self::new(reference);
        path.alias = Some(alias.into());
        path
    }

    /// The store handle for this location.
    pub fn reference(&self) -> &SharedRef {
        &self.reference
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The location's own identifier, `None` for the store root.
    pub fn key(&self) -> Option<String> {
        self.reference.key()
    }

    /// The alias if one was given, otherwise the location's key.
    pub fn name(&self) -> String {
        self.alias
            .clone()
            .or_else(|| self.key())
            .unwrap_or_default()
    }

    /// Canonical URL of the location; two paths are the same location iff
    /// their URLs are equal.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The path one level down, aliased by the child's key.
    pub fn child(&self, key: &str) -> Path {
        Path::with_alias(self.reference.child(key), key)
    }

    pub fn same_location(&self, other: &Path) -> bool {
        self.url == other.url
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.alias == other.alias
    }
}

impl Eq for Path {}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Path")
            .field("url", &self.url)
            .field("alias", &self.alias)
            .finish()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Ordered set of distinct paths backing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathManager {
    paths: Vec<Path>,
    master: Option<usize>,
}

impl PathManager {
    /// Builds a path set without a designated master.
    ///
    /// A single path is implicitly its own master.
    ///
    /// # Errors
    /// Fails when `paths` is empty, or when two paths share a location or an
    /// alias.
    pub fn new(paths: Vec<Path>) -> Result<Self, PathError> {
        if paths.is_empty() {
            return Err(PathError::Empty);
        }
        let mut urls = HashSet::new();
        let mut aliases = HashSet::new();
        for path in &paths {
            if !urls.insert(path.url()) {
                return Err(PathError::DuplicateLocation {
                    url: path.url().to_string(),
                });
            }
            if let Some(alias) = path.alias() {
                if !aliases.insert(alias) {
                    return Err(PathError::DuplicateAlias {
                        alias: alias.to_string(),
                    });
                }
            }
        }
        Ok(Self {
            paths,
            master: None,
        })
    }

    /// Builds a path set whose `master`-th path receives whole-store operations.
    pub fn with_master(paths: Vec<Path>, master: usize) -> Result<Self, PathError> {
        let mut manager = Self::new(paths)?;
        if master >= manager.paths.len() {
            return Err(PathError::MasterOutOfRange {
                index: master,
                count: manager.paths.len(),
            });
        }
        manager.master = Some(master);
        Ok(manager)
    }

    /// Number of distinct backing locations.
    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// The first (for single-path records, the sole) path.
    pub fn first(&self) -> &Path {
        // Construction guarantees at least one path.
        &self.paths[0]
    }

    /// Position of the path that receives whole-store operations.
    pub fn master_index(&self) -> Result<usize, PathError> {
        match (self.master, self.paths.len()) {
            (Some(index), _) => Ok(index),
            (None, 1) => Ok(0),
            (None, count) => Err(PathError::NoMaster { count }),
        }
    }

    /// The path that receives whole-store operations.
    ///
    /// # Errors
    /// Fails with [`PathError::NoMaster`] when several paths are present and
    /// none was designated.
    pub fn master(&self) -> Result<&Path, PathError> {
        Ok(&self.paths[self.master_index()?])
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Path> {
        self.paths.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.paths.get(index)
    }

    /// Position of the path at the same location as `path`.
    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.paths.iter().position(|p| p.same_location(path))
    }

    /// Finds a path by alias, falling back to the location key.
    pub fn find(&self, name: &str) -> Option<(usize, &Path)> {
        self.paths
            .iter()
            .enumerate()
            .find(|(_, p)| p.alias() == Some(name))
            .or_else(|| {
                self.paths
                    .iter()
                    .enumerate()
                    .find(|(_, p)| p.key().as_deref() == Some(name))
            })
    }
}

impl<'a> IntoIterator for &'a PathManager {
    type Item = &'a Path;
    type IntoIter = std::slice::Iter<'a, Path>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}
