//! Point-in-time reads of a single store location.

use serde_json::{Map, Value};

use super::EventType;
use crate::constants::{PATH_SEPARATOR, PRIORITY_KEY, VALUE_KEY};

/// A point-in-time read of one location, as delivered by the store.
///
/// A snapshot owns its value. Child snapshots are cut from the parent's value
/// and do not carry priorities of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    key: Option<String>,
    value: Value,
    priority: Option<Value>,
}

impl Snapshot {
    /// Creates a snapshot of the location named `key` holding `value`.
    ///
    /// `key` is `None` only for the store root.
    pub fn new(key: Option<String>, value: Value) -> Self {
        Self {
            key,
            value,
            priority: None,
        }
    }

    /// Attaches an ordering priority to this snapshot.
    pub fn with_priority(mut self, priority: Option<Value>) -> Self {
        self.priority = priority.filter(|p| !p.is_null());
        self
    }

    /// The identifier of the location this snapshot was read from.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The raw value, `Value::Null` when the location holds no data.
    pub fn val(&self) -> Value {
        self.value.clone()
    }

    /// Borrowed access to the raw value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The location's ordering priority, if one was set.
    pub fn priority(&self) -> Option<&Value> {
        self.priority.as_ref()
    }

    /// The value together with its priority metadata.
    ///
    /// Objects gain a `.priority` member; primitives are wrapped as
    /// `{".value": v, ".priority": p}`. Without a priority this equals [`val`](Self::val).
    pub fn export_val(&self) -> Value {
        let Some(priority) = &self.priority else {
            return self.val();
        };
        match &self.value {
            Value::Null => Value::Null,
            Value::Object(map) => {
                let mut out = map.clone();
                out.insert(PRIORITY_KEY.to_string(), priority.clone());
                Value::Object(out)
            }
            other => {
                let mut out = Map::new();
                out.insert(VALUE_KEY.to_string(), other.clone());
                out.insert(PRIORITY_KEY.to_string(), priority.clone());
                Value::Object(out)
            }
        }
    }

    /// Whether the location holds any data.
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Whether a (possibly nested, `/`-separated) child holds data.
    pub fn has_child(&self, path: &str) -> bool {
        lookup(&self.value, path).is_some_and(|v| !v.is_null())
    }

    /// Snapshot of a (possibly nested, `/`-separated) child.
    ///
    /// Missing children produce an empty snapshot rather than an error.
    pub fn child(&self, path: &str) -> Snapshot {
        let key = path
            .split(PATH_SEPARATOR)
            .rfind(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.key.clone());
        let value = lookup(&self.value, path).cloned().unwrap_or(Value::Null);
        Snapshot::new(key, value)
    }

    /// Iterates the direct children in storage order.
    pub fn children(&self) -> impl Iterator<Item = Snapshot> + '_ {
        child_entries(&self.value)
            .into_iter()
            .map(|(key, value)| Snapshot::new(Some(key), value.clone()))
    }

    /// Visits each direct child until `action` returns `true`.
    ///
    /// Returns `true` when iteration was aborted.
    pub fn for_each(&self, mut action: impl FnMut(Snapshot) -> bool) -> bool {
        self.children().any(|child| action(child))
    }

    /// Number of direct children.
    pub fn num_children(&self) -> usize {
        match &self.value {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.iter().filter(|v| !v.is_null()).count(),
            _ => 0,
        }
    }
}

/// Resolves a `/`-separated path inside a JSON value.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split(PATH_SEPARATOR)
        .filter(|s| !s.is_empty())
        .try_fold(value, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn child_entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

/// Computes the child events that turn `previous` into `current`.
///
/// Removals are reported first, then additions and changes in `current`'s
/// child order.
pub fn diff_children(previous: &Value, current: &Value) -> Vec<(EventType, String)> {
    let before = child_entries(previous);
    let after = child_entries(current);

    let mut events: Vec<(EventType, String)> = before
        .iter()
        .filter(|(key, _)| !after.iter().any(|(k, _)| k == key))
        .map(|(key, _)| (EventType::ChildRemoved, key.clone()))
        .collect();

    for (key, value) in &after {
        match before.iter().find(|(k, _)| k == key) {
            None => events.push((EventType::ChildAdded, key.clone())),
            Some((_, old)) if old != value => events.push((EventType::ChildChanged, key.clone())),
            Some(_) => {}
        }
    }
    events
}
