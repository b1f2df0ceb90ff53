//! The contract consumed from the underlying real-time store.
//!
//! A normalized reference never talks to storage directly. Every read, write,
//! subscription and whole-store operation goes through a [`StoreRef`], the
//! handle for one location of a tree-structured store. [`MemoryStore`] is a
//! complete in-process implementation used by the tests and demos.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

mod errors;
pub use errors::StoreError;

mod snapshot;
pub use snapshot::{Snapshot, diff_children};
pub(crate) use snapshot::lookup;

mod push_id;
pub use push_id::PushIdGenerator;

mod memory;
pub use memory::{ConnectivityChange, MemoryStore};

/// Shared handle to one store location.
pub type SharedRef = Arc<dyn StoreRef>;

/// Receives the snapshot for each delivered event.
pub type SnapshotHandler = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Invoked once if the store revokes a listener.
pub type CancelHandler = Box<dyn FnOnce(StoreError) + Send>;

/// Invoked once when a write has been acknowledged or rejected.
pub type Completion = Box<dyn FnOnce(Result<(), StoreError>) + Send>;

/// Invoked once with the outcome of an authentication request.
pub type AuthCallback = Box<dyn FnOnce(Result<AuthData, StoreError>) + Send>;

/// Receives every change of authentication state.
pub type AuthHandler = Arc<dyn Fn(Option<&AuthData>) + Send + Sync>;

/// Token identifying one listener registration.
///
/// `off` removes exactly the registration that `on` returned the token for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Change notifications a location can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Value,
    ChildAdded,
    ChildChanged,
    ChildRemoved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Value => "value",
            EventType::ChildAdded => "child_added",
            EventType::ChildChanged => "child_changed",
            EventType::ChildRemoved => "child_removed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(EventType::Value),
            "child_added" => Ok(EventType::ChildAdded),
            "child_changed" => Ok(EventType::ChildChanged),
            "child_removed" => Ok(EventType::ChildRemoved),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// Ways to establish an authenticated session with the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthRequest {
    /// Legacy secret or token authentication
    Token(String),
    CustomToken(String),
    Anonymous,
    Password { email: String, password: String },
    OAuthPopup { provider: String },
    OAuthRedirect { provider: String },
    OAuthToken { provider: String, token: String },
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    pub uid: String,
    pub provider: String,
    pub token: Option<String>,
    /// RFC3339 timestamp of when the session was established
    pub issued_at: String,
}

/// Account management requests for password-based users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRequest {
    Create {
        email: String,
        password: String,
    },
    ChangePassword {
        email: String,
        old_password: String,
        new_password: String,
    },
    Remove {
        email: String,
        password: String,
    },
    ResetPassword {
        email: String,
    },
    ChangeEmail {
        old_email: String,
        password: String,
        new_email: String,
    },
}

/// Handle for one location of a real-time tree-structured store.
///
/// Writes report their outcome through the optional completion; subscriptions
/// deliver snapshots to the handler until removed with `off`. Implementations
/// must not hold internal locks while invoking handlers or completions, since
/// those commonly call back into the store.
pub trait StoreRef: Send + Sync + fmt::Debug {
    /// Identifier of this location, `None` for the store root.
    fn key(&self) -> Option<String>;

    /// Canonical URL of this location.
    fn url(&self) -> Url;

    /// Handle for a descendant; `path` may contain `/`-separated segments.
    fn child(&self, path: &str) -> SharedRef;

    /// Registers `handler` for `event` at this location.
    fn on(
        &self,
        event: EventType,
        handler: SnapshotHandler,
        cancel: Option<CancelHandler>,
    ) -> ListenerId;

    /// Removes the registration identified by `id`.
    fn off(&self, event: EventType, id: ListenerId);

    /// Overwrites this location, optionally with a priority.
    fn set(&self, value: Value, priority: Option<Value>, on_complete: Option<Completion>);

    /// Writes the given children, leaving other children untouched.
    ///
    /// Keys may contain `/` to address deeper descendants.
    fn update(&self, values: Map<String, Value>, on_complete: Option<Completion>);

    /// Deletes this location.
    fn remove(&self, on_complete: Option<Completion>) {
        self.set(Value::Null, None, on_complete);
    }

    fn set_priority(&self, priority: Value, on_complete: Option<Completion>);

    /// Handle for a new child named by a unique, chronologically ordered id.
    ///
    /// Performs no write.
    fn push(&self) -> SharedRef;

    fn go_online(&self);

    fn go_offline(&self);

    fn authenticate(&self, request: AuthRequest, on_complete: Option<AuthCallback>);

    fn unauth(&self);

    fn get_auth(&self) -> Option<AuthData>;

    fn on_auth(&self, handler: AuthHandler) -> ListenerId;

    fn off_auth(&self, id: ListenerId);

    fn manage_user(&self, request: UserRequest, on_complete: Option<Completion>);
}
