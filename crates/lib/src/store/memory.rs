//! In-memory store implementation
//!
//! This module provides a complete in-process implementation of the
//! [`StoreRef`] contract, suitable for tests, demos and embedding. Data lives
//! in a single JSON tree behind a lock; every write notifies the listeners of
//! related locations after the lock has been released.
//!
//! Beyond plain storage it models the parts of a hosted store that normalized
//! references delegate to: offline mode (writes apply locally, completions
//! wait for `go_online`), write and read denial rules, push ids and a small
//! password/OAuth authentication registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Map, Value};
use url::Url;

use super::{
    AuthCallback, AuthData, AuthHandler, AuthRequest, CancelHandler, Completion, EventType,
    ListenerId, PushIdGenerator, SharedRef, Snapshot, SnapshotHandler, StoreError, StoreRef,
    UserRequest, diff_children, lookup,
};
use crate::clock::{Clock, SystemClock};
use crate::constants::PATH_SEPARATOR;

/// One entry of the connectivity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityChange {
    /// URL of the location the toggle was invoked on
    pub url: String,
    pub online: bool,
}

struct Registration {
    id: ListenerId,
    segments: Vec<String>,
    event: EventType,
    handler: SnapshotHandler,
    cancel: Option<CancelHandler>,
    last: Snapshot,
}

#[derive(Default)]
struct AuthState {
    current: Option<AuthData>,
    handlers: Vec<(ListenerId, AuthHandler)>,
    /// email -> password
    users: HashMap<String, String>,
    anonymous_sessions: u64,
}

struct StoreInner {
    base: Url,
    data: RwLock<Value>,
    /// Joined location path -> priority
    priorities: RwLock<HashMap<String, Value>>,
    listeners: Mutex<Vec<Registration>>,
    next_listener: AtomicU64,
    online: AtomicBool,
    deferred: Mutex<Vec<(Completion, Result<(), StoreError>)>>,
    connectivity: Mutex<Vec<ConnectivityChange>>,
    denied_writes: RwLock<Vec<Vec<String>>>,
    denied_reads: RwLock<Vec<Vec<String>>>,
    auth: Mutex<AuthState>,
    push_ids: PushIdGenerator,
    clock: Arc<dyn Clock>,
}

/// A real-time tree store held entirely in memory.
///
/// Cloning a `MemoryStore` yields another handle to the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("base", &self.inner.base.as_str())
            .field("online", &self.is_online())
            .finish()
    }
}

impl MemoryStore {
    /// Creates an empty store addressed by `base_url`.
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        Self::with_clock(base_url, Arc::new(SystemClock))
    }

    /// Creates an empty store whose push ids and sessions read time from `clock`.
    pub fn with_clock(base_url: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let base = Url::parse(base_url).map_err(|e| StoreError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl {
                url: base_url.to_string(),
                reason: "URL cannot address child locations".to_string(),
            });
        }
        Ok(Self {
            inner: Arc::new(StoreInner {
                base,
                data: RwLock::new(Value::Null),
                priorities: RwLock::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                online: AtomicBool::new(true),
                deferred: Mutex::new(Vec::new()),
                connectivity: Mutex::new(Vec::new()),
                denied_writes: RwLock::new(Vec::new()),
                denied_reads: RwLock::new(Vec::new()),
                auth: Mutex::new(AuthState::default()),
                push_ids: PushIdGenerator::new(clock.clone()),
                clock,
            }),
        })
    }

    /// Handle for the root location.
    pub fn root(&self) -> SharedRef {
        self.reference("")
    }

    /// Handle for the location at `path` (`/`-separated, relative to the root).
    pub fn reference(&self, path: &str) -> SharedRef {
        Arc::new(MemoryRef {
            store: self.inner.clone(),
            segments: split_path(path),
        })
    }

    /// Current raw value at `path`.
    pub fn value_at(&self, path: &str) -> Value {
        let data = self.inner.data.read().unwrap();
        lookup(&data, path).cloned().unwrap_or(Value::Null)
    }

    /// Makes every write at or below `path` fail with `PermissionDenied`.
    pub fn deny_writes(&self, path: &str) {
        self.inner
            .denied_writes
            .write()
            .unwrap()
            .push(split_path(path));
    }

    /// Lifts a rule installed by [`deny_writes`](Self::deny_writes).
    pub fn allow_writes(&self, path: &str) {
        let segments = split_path(path);
        self.inner
            .denied_writes
            .write()
            .unwrap()
            .retain(|rule| *rule != segments);
    }

    /// Revokes read access at or below `path`.
    ///
    /// Existing listeners there are cancelled and removed; later registrations
    /// are cancelled immediately.
    pub fn deny_reads(&self, path: &str) {
        let segments = split_path(path);
        self.inner
            .denied_reads
            .write()
            .unwrap()
            .push(segments.clone());

        let revoked: Vec<Registration> = {
            let mut listeners = self.inner.listeners.lock().unwrap();
            let (revoked, kept): (Vec<Registration>, Vec<Registration>) =
                std::mem::take(&mut *listeners)
                    .into_iter()
                    .partition(|reg| reg.segments.starts_with(&segments));
            *listeners = kept;
            revoked
        };
        for reg in revoked {
            tracing::debug!(listener = %reg.id, path = %join_path(&reg.segments), "Cancelling listener");
            if let Some(cancel) = reg.cancel {
                cancel(StoreError::ListenerCancelled {
                    path: join_path(&reg.segments),
                    reason: "read access revoked".to_string(),
                });
            }
        }
    }

    /// Whether the store is currently online.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Every `go_online`/`go_offline` invocation, in call order.
    pub fn connectivity_log(&self) -> Vec<ConnectivityChange> {
        self.inner.connectivity.lock().unwrap().clone()
    }

    /// Number of active listener registrations.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }

    /// Number of write completions waiting for the store to come back online.
    pub fn pending_completions(&self) -> usize {
        self.inner.deferred.lock().unwrap().len()
    }
}

/// Handle for one location of a [`MemoryStore`].
pub(crate) struct MemoryRef {
    store: Arc<StoreInner>,
    segments: Vec<String>,
}

impl std::fmt::Debug for MemoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MemoryRef").field(&self.url().as_str()).finish()
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split(PATH_SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_path(segments: &[String]) -> String {
    segments.join("/")
}

fn is_related(a: &[String], b: &[String]) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Drops nulls and empty objects so that "no data" has exactly one shape.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

fn write_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    let child = map.entry(head.clone()).or_insert(Value::Null);
    write_at(child, rest, value);
    if child.is_null() {
        map.shift_remove(head);
    }
    if map.is_empty() {
        *node = Value::Null;
    }
}

impl StoreInner {
    fn snapshot(&self, data: &Value, segments: &[String]) -> Snapshot {
        let path = join_path(segments);
        let value = lookup(data, &path).cloned().unwrap_or(Value::Null);
        let priority = self.priorities.read().unwrap().get(&path).cloned();
        Snapshot::new(segments.last().cloned(), value).with_priority(priority)
    }

    fn write_denied(&self, segments: &[String]) -> bool {
        self.denied_writes
            .read()
            .unwrap()
            .iter()
            .any(|rule| segments.starts_with(rule))
    }

    fn read_denied(&self, segments: &[String]) -> bool {
        self.denied_reads
            .read()
            .unwrap()
            .iter()
            .any(|rule| segments.starts_with(rule))
    }

    /// Applies each `(location, value)` write, or none if any is denied.
    fn apply(
        &self,
        writes: Vec<(Vec<String>, Value)>,
        priority: Option<(Vec<String>, Option<Value>)>,
    ) -> Result<(), StoreError> {
        if let Some((segments, _)) = writes.iter().find(|(s, _)| self.write_denied(s)) {
            return Err(StoreError::PermissionDenied {
                path: join_path(segments),
            });
        }
        {
            let mut data = self.data.write().unwrap();
            let mut priorities = self.priorities.write().unwrap();
            for (segments, value) in &writes {
                let value = prune(value.clone());
                if value.is_null() {
                    let prefix = join_path(segments);
                    priorities.retain(|path, _| {
                        !(prefix.is_empty()
                            || *path == prefix
                            || path.starts_with(&format!("{prefix}/")))
                    });
                }
                write_at(&mut data, segments, value);
            }
            if let Some((segments, priority)) = priority {
                match priority.filter(|p| !p.is_null()) {
                    Some(p) => priorities.insert(join_path(&segments), p),
                    None => priorities.remove(&join_path(&segments)),
                };
            }
        }
        for (segments, _) in &writes {
            self.notify(segments);
        }
        Ok(())
    }

    /// Delivers events to every listener related to `written`.
    fn notify(&self, written: &[String]) {
        let mut deliveries: Vec<(SnapshotHandler, Snapshot)> = Vec::new();
        {
            let data = self.data.read().unwrap();
            let mut listeners = self.listeners.lock().unwrap();
            for reg in listeners
                .iter_mut()
                .filter(|reg| is_related(&reg.segments, written))
            {
                let current = self.snapshot(&data, &reg.segments);
                match reg.event {
                    EventType::Value => {
                        if current != reg.last {
                            deliveries.push((reg.handler.clone(), current.clone()));
                        }
                    }
                    wanted => {
                        for (event, key) in diff_children(reg.last.value(), current.value()) {
                            if event != wanted {
                                continue;
                            }
                            let child = if event == EventType::ChildRemoved {
                                reg.last.child(&key)
                            } else {
                                current.child(&key)
                            };
                            deliveries.push((reg.handler.clone(), child));
                        }
                    }
                }
                reg.last = current;
            }
        }
        for (handler, snapshot) in deliveries {
            handler(&snapshot);
        }
    }

    fn complete(&self, on_complete: Option<Completion>, result: Result<(), StoreError>) {
        let Some(on_complete) = on_complete else {
            return;
        };
        if self.online.load(Ordering::SeqCst) {
            on_complete(result);
        } else {
            self.deferred.lock().unwrap().push((on_complete, result));
        }
    }

    fn notify_auth(&self) {
        let (current, handlers) = {
            let auth = self.auth.lock().unwrap();
            let handlers: Vec<AuthHandler> = auth.handlers.iter().map(|(_, h)| h.clone()).collect();
            (auth.current.clone(), handlers)
        };
        for handler in handlers {
            handler(current.as_ref());
        }
    }

    fn session(&self, uid: String, provider: &str, token: Option<String>) -> AuthData {
        AuthData {
            uid,
            provider: provider.to_string(),
            token,
            issued_at: self.clock.now_rfc3339(),
        }
    }

    fn resolve_auth(&self, request: AuthRequest) -> Result<AuthData, StoreError> {
        let mut auth = self.auth.lock().unwrap();
        match request {
            AuthRequest::Token(token) | AuthRequest::CustomToken(token) => {
                if token.trim().is_empty() {
                    return Err(StoreError::AuthenticationFailed {
                        reason: "empty token".to_string(),
                    });
                }
                Ok(self.session(format!("custom:{token}"), "custom", Some(token)))
            }
            AuthRequest::Anonymous => {
                auth.anonymous_sessions += 1;
                let uid = format!("anonymous:{}", auth.anonymous_sessions);
                Ok(self.session(uid, "anonymous", None))
            }
            AuthRequest::Password { email, password } => match auth.users.get(&email) {
                Some(stored) if *stored == password => {
                    Ok(self.session(format!("password:{email}"), "password", None))
                }
                _ => Err(StoreError::InvalidCredentials { email }),
            },
            AuthRequest::OAuthPopup { provider } | AuthRequest::OAuthRedirect { provider } => {
                let uid = format!("{provider}:{}", self.push_ids.next_id());
                Ok(self.session(uid, &provider, None))
            }
            AuthRequest::OAuthToken { provider, token } => {
                if token.trim().is_empty() {
                    return Err(StoreError::AuthenticationFailed {
                        reason: format!("empty {provider} token"),
                    });
                }
                Ok(self.session(format!("{provider}:{token}"), &provider, Some(token)))
            }
        }
    }

    fn check_password(
        users: &HashMap<String, String>,
        email: &str,
        password: &str,
    ) -> Result<(), StoreError> {
        match users.get(email) {
            None => Err(StoreError::UserNotFound {
                email: email.to_string(),
            }),
            Some(stored) if stored != password => Err(StoreError::InvalidCredentials {
                email: email.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn resolve_user(&self, request: UserRequest) -> Result<(), StoreError> {
        let mut auth = self.auth.lock().unwrap();
        let users = &mut auth.users;
        match request {
            UserRequest::Create { email, password } => {
                if users.contains_key(&email) {
                    return Err(StoreError::UserExists { email });
                }
                users.insert(email, password);
            }
            UserRequest::ChangePassword {
                email,
                old_password,
                new_password,
            } => {
                Self::check_password(users, &email, &old_password)?;
                users.insert(email, new_password);
            }
            UserRequest::Remove { email, password } => {
                Self::check_password(users, &email, &password)?;
                users.remove(&email);
            }
            UserRequest::ResetPassword { email } => {
                if !users.contains_key(&email) {
                    return Err(StoreError::UserNotFound { email });
                }
                tracing::debug!(%email, "Password reset requested");
            }
            UserRequest::ChangeEmail {
                old_email,
                password,
                new_email,
            } => {
                Self::check_password(users, &old_email, &password)?;
                if users.contains_key(&new_email) {
                    return Err(StoreError::UserExists { email: new_email });
                }
                users.remove(&old_email);
                users.insert(new_email, password);
            }
        }
        Ok(())
    }
}

impl MemoryRef {
    fn descend(&self, path: &str) -> Vec<String> {
        let mut segments = self.segments.clone();
        segments.extend(split_path(path));
        segments
    }
}

impl StoreRef for MemoryRef {
    fn key(&self) -> Option<String> {
        self.segments.last().cloned()
    }

    fn url(&self) -> Url {
        let mut url = self.store.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(&self.segments);
        }
        url
    }

    fn child(&self, path: &str) -> SharedRef {
        Arc::new(MemoryRef {
            store: self.store.clone(),
            segments: self.descend(path),
        })
    }

    fn on(
        &self,
        event: EventType,
        handler: SnapshotHandler,
        cancel: Option<CancelHandler>,
    ) -> ListenerId {
        let id = ListenerId::new(self.store.next_listener.fetch_add(1, Ordering::SeqCst));

        if self.store.read_denied(&self.segments) {
            if let Some(cancel) = cancel {
                cancel(StoreError::ListenerCancelled {
                    path: join_path(&self.segments),
                    reason: "read access denied".to_string(),
                });
            }
            return id;
        }

        let current = {
            let data = self.store.data.read().unwrap();
            self.store.snapshot(&data, &self.segments)
        };
        self.store.listeners.lock().unwrap().push(Registration {
            id,
            segments: self.segments.clone(),
            event,
            handler: handler.clone(),
            cancel,
            last: current.clone(),
        });
        tracing::debug!(listener = %id, %event, path = %join_path(&self.segments), "Listener registered");

        match event {
            EventType::Value => handler(&current),
            EventType::ChildAdded => {
                for child in current.children() {
                    handler(&child);
                }
            }
            EventType::ChildChanged | EventType::ChildRemoved => {}
        }
        id
    }

    fn off(&self, event: EventType, id: ListenerId) {
        self.store
            .listeners
            .lock()
            .unwrap()
            .retain(|reg| !(reg.id == id && reg.event == event));
        tracing::debug!(listener = %id, %event, path = %join_path(&self.segments), "Listener removed");
    }

    fn set(&self, value: Value, priority: Option<Value>, on_complete: Option<Completion>) {
        let result = self.store.apply(
            vec![(self.segments.clone(), value)],
            Some((self.segments.clone(), priority)),
        );
        self.store.complete(on_complete, result);
    }

    fn update(&self, values: Map<String, Value>, on_complete: Option<Completion>) {
        let writes = values
            .into_iter()
            .map(|(key, value)| (self.descend(&key), value))
            .collect();
        let result = self.store.apply(writes, None);
        self.store.complete(on_complete, result);
    }

    fn set_priority(&self, priority: Value, on_complete: Option<Completion>) {
        let result = if self.store.write_denied(&self.segments) {
            Err(StoreError::PermissionDenied {
                path: join_path(&self.segments),
            })
        } else {
            self.store
                .priorities
                .write()
                .unwrap()
                .insert(join_path(&self.segments), priority);
            self.store.notify(&self.segments);
            Ok(())
        };
        self.store.complete(on_complete, result);
    }

    fn push(&self) -> SharedRef {
        self.child(&self.store.push_ids.next_id())
    }

    fn go_online(&self) {
        self.store.online.store(true, Ordering::SeqCst);
        self.store
            .connectivity
            .lock()
            .unwrap()
            .push(ConnectivityChange {
                url: self.url().to_string(),
                online: true,
            });
        let deferred = std::mem::take(&mut *self.store.deferred.lock().unwrap());
        tracing::debug!(flushed = deferred.len(), "Store back online");
        for (on_complete, result) in deferred {
            on_complete(result);
        }
    }

    fn go_offline(&self) {
        self.store.online.store(false, Ordering::SeqCst);
        self.store
            .connectivity
            .lock()
            .unwrap()
            .push(ConnectivityChange {
                url: self.url().to_string(),
                online: false,
            });
    }

    fn authenticate(&self, request: AuthRequest, on_complete: Option<AuthCallback>) {
        let result = self.store.resolve_auth(request);
        if let Ok(session) = &result {
            self.store.auth.lock().unwrap().current = Some(session.clone());
            self.store.notify_auth();
        }
        if let Some(on_complete) = on_complete {
            on_complete(result);
        }
    }

    fn unauth(&self) {
        let was_authenticated = self.store.auth.lock().unwrap().current.take().is_some();
        if was_authenticated {
            self.store.notify_auth();
        }
    }

    fn get_auth(&self) -> Option<AuthData> {
        self.store.auth.lock().unwrap().current.clone()
    }

    fn on_auth(&self, handler: AuthHandler) -> ListenerId {
        let id = ListenerId::new(self.store.next_listener.fetch_add(1, Ordering::SeqCst));
        let current = {
            let mut auth = self.store.auth.lock().unwrap();
            auth.handlers.push((id, handler.clone()));
            auth.current.clone()
        };
        handler(current.as_ref());
        id
    }

    fn off_auth(&self, id: ListenerId) {
        self.store
            .auth
            .lock()
            .unwrap()
            .handlers
            .retain(|(registered, _)| *registered != id);
    }

    fn manage_user(&self, request: UserRequest, on_complete: Option<Completion>) {
        let result = self.store.resolve_user(request);
        if let Some(on_complete) = on_complete {
            on_complete(result);
        }
    }
}
