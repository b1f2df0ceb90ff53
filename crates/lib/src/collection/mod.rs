//! Building normalized references from locations and field selectors.
//!
//! [`NormalizedCollection`] is the programmatic entry point:
//!
//! ```
//! use normref::collection::{NormalizedCollection, PathSpec};
//! use normref::store::MemoryStore;
//!
//! let store = MemoryStore::new("https://example.test")?;
//! let users = NormalizedCollection::new([
//!     PathSpec::new(store.reference("users/kato")).alias("u"),
//!     PathSpec::new(store.reference("profiles/kato")).alias("p"),
//! ])
//! .select(["u.$key as id", "u.name", "p.bio as about"])
//! .reference()?;
//! assert_eq!(users.key(), "[u][p]");
//! # Ok::<(), normref::Error>(())
//! ```
//!
//! [`CollectionConfig`] is the same description as JSON, resolved against a
//! root location.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::field_map::FieldMap;
use crate::path::{Path, PathError, PathManager};
use crate::record::Record;
use crate::reference::{Diagnostics, NormalizedRef, TracingDiagnostics};
use crate::store::SharedRef;

mod errors;
pub use errors::ConfigError;

/// One location taking part in a collection.
#[derive(Clone)]
pub struct PathSpec {
    reference: SharedRef,
    alias: Option<String>,
    master: bool,
}

impl PathSpec {
    pub fn new(reference: SharedRef) -> Self {
        Self {
            reference,
            alias: None,
            master: false,
        }
    }

    /// Name used in field selectors instead of the location key.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Marks this location as the target of whole-store operations.
    pub fn master(mut self) -> Self {
        self.master = true;
        self
    }

    fn path(&self) -> Path {
        match &self.alias {
            Some(alias) => Path::with_alias(self.reference.clone(), alias.clone()),
            None => Path::new(self.reference.clone()),
        }
    }
}

impl From<SharedRef> for PathSpec {
    fn from(reference: SharedRef) -> Self {
        Self::new(reference)
    }
}

impl fmt::Debug for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathSpec")
            .field("url", &self.reference.url().as_str())
            .field("alias", &self.alias)
            .field("master", &self.master)
            .finish()
    }
}

/// Builder joining several locations into one [`NormalizedRef`].
///
/// The first path is master unless another one is flagged with
/// [`PathSpec::master`].
#[derive(Debug, Clone)]
pub struct NormalizedCollection {
    paths: Vec<PathSpec>,
    selectors: Vec<String>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl NormalizedCollection {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathSpec>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            selectors: Vec::new(),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Adds field selectors of the form `<path>.<key>[ as <name>]`.
    pub fn select<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectors.extend(selectors.into_iter().map(Into::into));
        self
    }

    /// Sink for deprecation warnings of the built references.
    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    fn path_manager(&self) -> Result<PathManager> {
        if self.paths.is_empty() {
            return Err(ConfigError::NoPaths.into());
        }
        let flagged: Vec<usize> = self
            .paths
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.master)
            .map(|(index, _)| index)
            .collect();
        let master = match flagged.as_slice() {
            [] => 0,
            [index] => *index,
            many => {
                return Err(PathError::MultipleMasters { count: many.len() }.into());
            }
        };
        let paths = self.paths.iter().map(PathSpec::path).collect();
        Ok(PathManager::with_master(paths, master)?)
    }

    /// Builds the joined record without wrapping it in a reference.
    pub fn record(&self) -> Result<Record> {
        let mut map = FieldMap::new(self.path_manager()?);
        if self.selectors.is_empty() {
            return Err(ConfigError::NoFields.into());
        }
        for selector in &self.selectors {
            map.add_selector(selector)?;
        }
        tracing::debug!(
            paths = self.paths.len(),
            fields = map.len(),
            "Built normalized record"
        );
        Record::set(map)
    }

    /// Builds the collection's root reference.
    pub fn reference(&self) -> Result<NormalizedRef> {
        Ok(NormalizedRef::with_diagnostics(
            self.record()?,
            self.diagnostics.clone(),
        ))
    }
}

/// A location in a [`CollectionConfig`], relative to the root location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub master: bool,
}

/// Serializable description of a collection.
///
/// ```json
/// {"paths": [{"path": "users/kato", "alias": "u"}], "fields": ["u.name"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub paths: Vec<PathConfig>,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl CollectionConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolves every path below `root`.
    pub fn collection(&self, root: &SharedRef) -> NormalizedCollection {
        NormalizedCollection::new(self.paths.iter().map(|config| {
            let spec = PathSpec::new(root.child(&config.path));
            let spec = match &config.alias {
                Some(alias) => spec.alias(alias.clone()),
                None => spec,
            };
            if config.master { spec.master() } else { spec }
        }))
        .select(self.fields.iter().cloned())
    }

    /// Resolves the configuration below `root` and builds its reference.
    pub fn build(&self, root: &SharedRef) -> Result<NormalizedRef> {
        self.collection(root).reference()
    }
}
