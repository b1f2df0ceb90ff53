use std::sync::{Arc, Mutex};

use normref::{
    NormalizedCollection, NormalizedRef, PathSpec,
    reference::Diagnostics,
    store::{
        AuthCallback, AuthData, AuthHandler, AuthRequest, CancelHandler, Completion, EventType,
        ListenerId, MemoryStore, SharedRef, SnapshotHandler, StoreError, StoreRef, UserRequest,
    },
};
use serde_json::{Map, Value};
use url::Url;

// Re-export tokio test macro for convenience
pub use tokio;

pub const BASE_URL: &str = "https://normref.example.test";

/// Creates an empty in-memory store.
pub fn test_store() -> MemoryStore {
    MemoryStore::new(BASE_URL).expect("Failed to create store")
}

/// URL of `path` in the test store.
pub fn url(path: &str) -> String {
    format!("{BASE_URL}/{path}")
}

/// Joins `users/kato` (alias `u`, master) with `profiles/kato` (alias `p`).
///
/// Fields, in order: `id` (`u.$key`), `name` (`u.name`), `about` (`p.bio`).
pub fn user_profile(store: &MemoryStore) -> NormalizedRef {
    NormalizedCollection::new([
        PathSpec::new(store.reference("users/kato")).alias("u").master(),
        PathSpec::new(store.reference("profiles/kato")).alias("p"),
    ])
    .select(["u.$key as id", "u.name", "p.bio as about"])
    .reference()
    .expect("Failed to build user/profile reference")
}

/// Completion that records its result, plus the record.
pub fn recorded() -> (Completion, Arc<Mutex<Vec<Result<(), StoreError>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let completion: Completion = Box::new(move |result| sink.lock().unwrap().push(result));
    (completion, seen)
}

/// Object built from `(key, value)` pairs, keeping their order.
pub fn object<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    Value::Object(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Map<String, Value>>(),
    )
}

/// Diagnostics sink that keeps every report.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    pub deprecated: Mutex<Vec<(&'static str, &'static str)>>,
}

impl Diagnostics for RecordingDiagnostics {
    fn deprecated(&self, api: &'static str, replacement: &'static str) {
        self.deprecated.lock().unwrap().push((api, replacement));
    }
}

/// Shared log of the operations a [`SpyRef`] saw, as `"<label>:<operation>"`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Store reference that logs whole-store operations before delegating.
#[derive(Debug)]
pub struct SpyRef {
    label: String,
    inner: SharedRef,
    log: CallLog,
}

impl SpyRef {
    pub fn wrap(label: &str, inner: SharedRef, log: &CallLog) -> SharedRef {
        Arc::new(Self {
            label: label.to_string(),
            inner,
            log: log.clone(),
        })
    }

    fn record(&self, operation: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{operation}", self.label));
    }
}

impl StoreRef for SpyRef {
    fn key(&self) -> Option<String> {
        self.inner.key()
    }

    fn url(&self) -> Url {
        self.inner.url()
    }

    fn child(&self, path: &str) -> SharedRef {
        SpyRef::wrap(&format!("{}/{path}", self.label), self.inner.child(path), &self.log)
    }

    fn on(
        &self,
        event: EventType,
        handler: SnapshotHandler,
        cancel: Option<CancelHandler>,
    ) -> ListenerId {
        self.inner.on(event, handler, cancel)
    }

    fn off(&self, event: EventType, id: ListenerId) {
        self.inner.off(event, id)
    }

    fn set(&self, value: Value, priority: Option<Value>, on_complete: Option<Completion>) {
        self.record("set");
        self.inner.set(value, priority, on_complete)
    }

    fn update(&self, values: Map<String, Value>, on_complete: Option<Completion>) {
        self.record("update");
        self.inner.update(values, on_complete)
    }

    fn set_priority(&self, priority: Value, on_complete: Option<Completion>) {
        self.record("set_priority");
        self.inner.set_priority(priority, on_complete)
    }

    fn push(&self) -> SharedRef {
        self.record("push");
        let pushed = self.inner.push();
        let key = pushed.key().unwrap_or_default();
        SpyRef::wrap(&format!("{}/{key}", self.label), pushed, &self.log)
    }

    fn go_online(&self) {
        self.record("go_online");
        self.inner.go_online()
    }

    fn go_offline(&self) {
        self.record("go_offline");
        self.inner.go_offline()
    }

    fn authenticate(&self, request: AuthRequest, on_complete: Option<AuthCallback>) {
        self.record("authenticate");
        self.inner.authenticate(request, on_complete)
    }

    fn unauth(&self) {
        self.record("unauth");
        self.inner.unauth()
    }

    fn get_auth(&self) -> Option<AuthData> {
        self.record("get_auth");
        self.inner.get_auth()
    }

    fn on_auth(&self, handler: AuthHandler) -> ListenerId {
        self.record("on_auth");
        self.inner.on_auth(handler)
    }

    fn off_auth(&self, id: ListenerId) {
        self.record("off_auth");
        self.inner.off_auth(id)
    }

    fn manage_user(&self, request: UserRequest, on_complete: Option<Completion>) {
        self.record("manage_user");
        self.inner.manage_user(request, on_complete)
    }
}

/// Joins spied `a` (master), `b` and `c` locations with one field each.
pub fn spied_collection(store: &MemoryStore) -> (NormalizedRef, CallLog) {
    let log = CallLog::default();
    let reference = NormalizedCollection::new([
        PathSpec::new(SpyRef::wrap("a", store.reference("a"), &log)).master(),
        PathSpec::new(SpyRef::wrap("b", store.reference("b"), &log)),
        PathSpec::new(SpyRef::wrap("c", store.reference("c"), &log)),
    ])
    .select(["a.x", "a.y", "b.x as bx", "c.$value as c"])
    .reference()
    .expect("Failed to build spied collection");
    (reference, log)
}

/// Drains and returns the call log.
pub fn take_calls(log: &CallLog) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}
