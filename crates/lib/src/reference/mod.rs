//! User-facing handles over normalized records.
//!
//! A [`NormalizedRef`] looks like a reference to one location of the store but
//! reads and writes a [`Record`] joined from several. Operations fall into
//! four groups:
//!
//! * navigation (`child`, `parent`, `root`), which derives narrower records;
//! * writes (`set`, `update`, `remove`, `set_with_priority`, `push`), which the
//!   record splits into one physical write per location;
//! * whole-store operations, which go to the master path (authentication,
//!   user management, `set_priority`) or to every path (`go_online`,
//!   `go_offline`);
//! * subscriptions (`on`, `off`, `once`), fed by a [`Synchronizer`] that merges
//!   the latest snapshot of every location.
//!
//! `transaction` and `on_disconnect` are rejected: they need atomic semantics
//! on a single location.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::Result;
use crate::constants::PATH_SEPARATOR;
use crate::path::Path;
use crate::record::{Record, SaveOptions, Synchronizer};
use crate::store::{
    AuthCallback, AuthData, AuthHandler, AuthRequest, CancelHandler, Completion, EventType,
    ListenerId, Snapshot, StoreError, UserRequest, diff_children,
};

mod diagnostics;
pub use diagnostics::{Diagnostics, TracingDiagnostics};

mod errors;
pub use errors::ReferenceError;

mod snapshot;
pub use snapshot::NormalizedSnapshot;

/// Receives merged snapshots for one registration.
pub type NormalizedHandler = Arc<dyn Fn(&NormalizedSnapshot) + Send + Sync>;

/// One link of the navigation chain. Holds only immutable records, never the
/// listener state of the references that created it.
#[derive(Debug)]
struct Lineage {
    record: Arc<Record>,
    parent: Option<Arc<Lineage>>,
}

struct Observer {
    id: ListenerId,
    event: EventType,
    handler: NormalizedHandler,
    cancel: Option<CancelHandler>,
}

#[derive(Default)]
struct ObserverState {
    observers: Vec<Observer>,
    /// Last emitted per-location snapshots, used to diff child events
    last: Option<Vec<Snapshot>>,
}

struct RefInner {
    node: Arc<Lineage>,
    root: Arc<Lineage>,
    diagnostics: Arc<dyn Diagnostics>,
    sync: Synchronizer,
    state: Mutex<ObserverState>,
    next_observer: AtomicU64,
}

/// A live, navigable view over one [`Record`].
///
/// Cloning is cheap and clones share subscriptions. Two references are equal
/// when they address the same canonical location URL.
#[derive(Clone)]
pub struct NormalizedRef {
    inner: Arc<RefInner>,
}

impl NormalizedRef {
    /// Wraps `record` as the root of a navigation chain.
    pub fn new(record: Record) -> Self {
        Self::with_diagnostics(record, Arc::new(TracingDiagnostics))
    }

    /// Like [`new`](Self::new), reporting deprecated usage to `diagnostics`.
    pub fn with_diagnostics(record: Record, diagnostics: Arc<dyn Diagnostics>) -> Self {
        let node = Arc::new(Lineage {
            record: Arc::new(record),
            parent: None,
        });
        Self::from_lineage(node.clone(), node, diagnostics)
    }

    fn from_lineage(
        node: Arc<Lineage>,
        root: Arc<Lineage>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<RefInner>| {
            let on_merge = weak.clone();
            let on_cancel = weak.clone();
            let sync = Synchronizer::new(
                node.record.paths().to_vec(),
                Arc::new(move |snaps: &[Snapshot]| {
                    if let Some(inner) = on_merge.upgrade() {
                        NormalizedRef { inner }.emit(snaps);
                    }
                }),
                Some(Arc::new(move |err: StoreError| {
                    if let Some(inner) = on_cancel.upgrade() {
                        NormalizedRef { inner }.cancel_all(err);
                    }
                })),
            );
            RefInner {
                node,
                root,
                diagnostics,
                sync,
                state: Mutex::new(ObserverState::default()),
                next_observer: AtomicU64::new(1),
            }
        });
        Self { inner }
    }

    /// The record this reference reads and writes.
    pub fn record(&self) -> &Record {
        &self.inner.node.record
    }

    pub fn paths(&self) -> &[Path] {
        self.record().paths()
    }

    /// The path whole-store operations are delegated to.
    pub fn master(&self) -> Result<&Path> {
        self.record().master()
    }

    /// Name of the referenced location.
    pub fn key(&self) -> String {
        self.record().name()
    }

    /// Same as [`key`](Self::key).
    #[deprecated(note = "use `key()` instead")]
    pub fn name(&self) -> String {
        self.inner.diagnostics.deprecated("name()", "key()");
        self.key()
    }

    /// Canonical URL of the referenced location(s).
    pub fn url(&self) -> String {
        self.record().url()
    }

    // Navigation

    /// Reference to the descendant at `path`.
    ///
    /// `a/b/c` descends one segment at a time, exactly like
    /// `child("a")?.child("b")?.child("c")`.
    pub fn child(&self, path: &str) -> Result<NormalizedRef> {
        let mut node = self.inner.node.clone();
        let mut descended = false;
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            node = Arc::new(Lineage {
                record: Arc::new(node.record.child(segment)?),
                parent: Some(node),
            });
            descended = true;
        }
        if !descended {
            return Err(ReferenceError::EmptyPath {
                path: path.to_string(),
            }
            .into());
        }
        Ok(Self::from_lineage(
            node,
            self.inner.root.clone(),
            self.inner.diagnostics.clone(),
        ))
    }

    /// The reference this one was derived from, `None` at the root.
    pub fn parent(&self) -> Option<NormalizedRef> {
        let parent = self.inner.node.parent.clone()?;
        Some(Self::from_lineage(
            parent,
            self.inner.root.clone(),
            self.inner.diagnostics.clone(),
        ))
    }

    /// The top of this reference's navigation chain.
    pub fn root(&self) -> NormalizedRef {
        if Arc::ptr_eq(&self.inner.node, &self.inner.root) {
            return self.clone();
        }
        Self::from_lineage(
            self.inner.root.clone(),
            self.inner.root.clone(),
            self.inner.diagnostics.clone(),
        )
    }

    // Writes

    /// Overwrites the record with `data`; `Value::Null` removes it.
    pub fn set(&self, data: Value, on_complete: Option<Completion>) -> Result<()> {
        self.record()
            .save_data(data, SaveOptions::set().with_callback(on_complete))
    }

    /// Writes only the fields named in `data`.
    pub fn update(&self, data: Value, on_complete: Option<Completion>) -> Result<()> {
        self.record()
            .save_data(data, SaveOptions::update().with_callback(on_complete))
    }

    pub fn remove(&self, on_complete: Option<Completion>) -> Result<()> {
        self.set(Value::Null, on_complete)
    }

    /// Like [`set`](Self::set), attaching an ordering priority.
    pub fn set_with_priority(
        &self,
        data: Value,
        priority: Value,
        on_complete: Option<Completion>,
    ) -> Result<()> {
        self.record().save_data(
            data,
            SaveOptions::set()
                .with_priority(priority)
                .with_callback(on_complete),
        )
    }

    /// Reference to a new child named by a fresh push id from the master
    /// location. Nothing is written.
    pub fn push(&self) -> Result<NormalizedRef> {
        let master = self.master()?;
        let pushed = master.reference().push();
        let id = pushed.key().ok_or_else(|| ReferenceError::MissingPushId {
            url: master.url().to_string(),
        })?;
        tracing::debug!(%id, url = master.url(), "Generated push id");
        self.child(&id)
    }

    /// Like [`push`](Self::push), then sets `data` on the new child.
    ///
    /// Returns as soon as the write has been issued; `on_complete` reports
    /// its outcome.
    pub fn push_with(&self, data: Value, on_complete: Option<Completion>) -> Result<NormalizedRef> {
        let child = self.push()?;
        child.set(data, on_complete)?;
        Ok(child)
    }

    /// Awaitable [`set`](Self::set).
    pub async fn set_async(&self, data: Value) -> Result<()> {
        let (done, rx) = self.completion();
        self.set(data, Some(done))?;
        self.settle(rx).await
    }

    /// Awaitable [`update`](Self::update).
    pub async fn update_async(&self, data: Value) -> Result<()> {
        let (done, rx) = self.completion();
        self.update(data, Some(done))?;
        self.settle(rx).await
    }

    /// Awaitable [`remove`](Self::remove).
    pub async fn remove_async(&self) -> Result<()> {
        let (done, rx) = self.completion();
        self.remove(Some(done))?;
        self.settle(rx).await
    }

    fn completion(&self) -> (Completion, oneshot::Receiver<std::result::Result<(), StoreError>>) {
        let (tx, rx) = oneshot::channel();
        let done: Completion = Box::new(move |result| {
            let _ = tx.send(result);
        });
        (done, rx)
    }

    async fn settle(&self, rx: oneshot::Receiver<std::result::Result<(), StoreError>>) -> Result<()> {
        match rx.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ReferenceError::CompletionDropped { url: self.url() }.into()),
        }
    }

    // Whole-store operations

    /// Sets the ordering priority of the master location.
    pub fn set_priority(&self, priority: Value, on_complete: Option<Completion>) -> Result<()> {
        self.master()?
            .reference()
            .set_priority(priority, on_complete);
        Ok(())
    }

    /// Reconnects every backing location.
    pub fn go_online(&self) {
        for path in self.paths() {
            path.reference().go_online();
        }
    }

    /// Disconnects every backing location.
    pub fn go_offline(&self) {
        for path in self.paths() {
            path.reference().go_offline();
        }
    }

    fn authenticate(&self, request: AuthRequest, on_complete: Option<AuthCallback>) -> Result<()> {
        self.master()?.reference().authenticate(request, on_complete);
        Ok(())
    }

    /// Authenticates with a legacy secret or token.
    pub fn auth(&self, token: impl Into<String>, on_complete: Option<AuthCallback>) -> Result<()> {
        self.authenticate(AuthRequest::Token(token.into()), on_complete)
    }

    pub fn auth_with_custom_token(
        &self,
        token: impl Into<String>,
        on_complete: Option<AuthCallback>,
    ) -> Result<()> {
        self.authenticate(AuthRequest::CustomToken(token.into()), on_complete)
    }

    pub fn auth_anonymously(&self, on_complete: Option<AuthCallback>) -> Result<()> {
        self.authenticate(AuthRequest::Anonymous, on_complete)
    }

    pub fn auth_with_password(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        on_complete: Option<AuthCallback>,
    ) -> Result<()> {
        self.authenticate(
            AuthRequest::Password {
                email: email.into(),
                password: password.into(),
            },
            on_complete,
        )
    }

    pub fn auth_with_oauth_popup(
        &self,
        provider: impl Into<String>,
        on_complete: Option<AuthCallback>,
    ) -> Result<()> {
        self.authenticate(
            AuthRequest::OAuthPopup {
                provider: provider.into(),
            },
            on_complete,
        )
    }

    pub fn auth_with_oauth_redirect(
        &self,
        provider: impl Into<String>,
        on_complete: Option<AuthCallback>,
    ) -> Result<()> {
        self.authenticate(
            AuthRequest::OAuthRedirect {
                provider: provider.into(),
            },
            on_complete,
        )
    }

    pub fn auth_with_oauth_token(
        &self,
        provider: impl Into<String>,
        token: impl Into<String>,
        on_complete: Option<AuthCallback>,
    ) -> Result<()> {
        self.authenticate(
            AuthRequest::OAuthToken {
                provider: provider.into(),
                token: token.into(),
            },
            on_complete,
        )
    }

    pub fn unauth(&self) -> Result<()> {
        self.master()?.reference().unauth();
        Ok(())
    }

    pub fn get_auth(&self) -> Result<Option<AuthData>> {
        Ok(self.master()?.reference().get_auth())
    }

    pub fn on_auth(
        &self,
        handler: impl Fn(Option<&AuthData>) + Send + Sync + 'static,
    ) -> Result<ListenerId> {
        let handler: AuthHandler = Arc::new(handler);
        Ok(self.master()?.reference().on_auth(handler))
    }

    pub fn off_auth(&self, id: ListenerId) -> Result<()> {
        self.master()?.reference().off_auth(id);
        Ok(())
    }

    fn manage_user(&self, request: UserRequest, on_complete: Option<Completion>) -> Result<()> {
        self.master()?.reference().manage_user(request, on_complete);
        Ok(())
    }

    pub fn create_user(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        on_complete: Option<Completion>,
    ) -> Result<()> {
        self.manage_user(
            UserRequest::Create {
                email: email.into(),
                password: password.into(),
            },
            on_complete,
        )
    }

    pub fn change_password(
        &self,
        email: impl Into<String>,
        old_password: impl Into<String>,
        new_password: impl Into<String>,
        on_complete: Option<Completion>,
    ) -> Result<()> {
        self.manage_user(
            UserRequest::ChangePassword {
                email: email.into(),
                old_password: old_password.into(),
                new_password: new_password.into(),
            },
            on_complete,
        )
    }

    pub fn remove_user(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        on_complete: Option<Completion>,
    ) -> Result<()> {
        self.manage_user(
            UserRequest::Remove {
                email: email.into(),
                password: password.into(),
            },
            on_complete,
        )
    }

    pub fn reset_password(
        &self,
        email: impl Into<String>,
        on_complete: Option<Completion>,
    ) -> Result<()> {
        self.manage_user(
            UserRequest::ResetPassword {
                email: email.into(),
            },
            on_complete,
        )
    }

    pub fn change_email(
        &self,
        old_email: impl Into<String>,
        password: impl Into<String>,
        new_email: impl Into<String>,
        on_complete: Option<Completion>,
    ) -> Result<()> {
        self.manage_user(
            UserRequest::ChangeEmail {
                old_email: old_email.into(),
                password: password.into(),
                new_email: new_email.into(),
            },
            on_complete,
        )
    }

    // Unsupported

    /// Always fails: transactions need atomicity on a single location.
    pub fn transaction<F>(&self, _update: F, _on_complete: Option<Completion>) -> Result<()>
    where
        F: FnMut(Value) -> Option<Value>,
    {
        Err(ReferenceError::Unsupported {
            operation: "transaction",
        }
        .into())
    }

    /// Always fails: disconnect writes need atomicity on a single location.
    pub fn on_disconnect(&self) -> Result<()> {
        Err(ReferenceError::Unsupported {
            operation: "onDisconnect",
        }
        .into())
    }

    // Subscriptions

    /// Registers `handler` for `event` on the merged view.
    ///
    /// The first registration subscribes to every backing location. `Value`
    /// observers receive the current merged snapshot once every location has
    /// reported; `ChildAdded` observers receive each existing child.
    pub fn on(
        &self,
        event: EventType,
        handler: impl Fn(&NormalizedSnapshot) + Send + Sync + 'static,
        cancel: Option<CancelHandler>,
    ) -> ListenerId {
        let handler: NormalizedHandler = Arc::new(handler);
        let id = ListenerId::new(self.inner.next_observer.fetch_add(1, Ordering::SeqCst));
        let current = {
            let mut state = self.inner.state.lock().unwrap();
            state.observers.push(Observer {
                id,
                event,
                handler: handler.clone(),
                cancel,
            });
            state.last.clone()
        };
        tracing::debug!(listener = %id, %event, url = %self.url(), "Observer registered");

        if !self.inner.sync.is_active() {
            self.inner.sync.start();
            return id;
        }
        if let Some(snap) = current.and_then(|snaps| self.snapshot(snaps)) {
            self.initial_delivery(id, event, &handler, &snap);
        }
        id
    }

    /// Like [`on`](Self::on), removing the registration after its first
    /// delivery.
    pub fn once(
        &self,
        event: EventType,
        handler: impl Fn(&NormalizedSnapshot) + Send + Sync + 'static,
        cancel: Option<CancelHandler>,
    ) -> ListenerId {
        let fired = Arc::new(AtomicBool::new(false));
        let registered: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let owner = Arc::downgrade(&self.inner);

        let wrapper = {
            let fired = fired.clone();
            let registered = registered.clone();
            move |snap: &NormalizedSnapshot| {
                if fired.swap(true, Ordering::SeqCst) {
                    return;
                }
                let id = registered.lock().unwrap().take();
                if let (Some(id), Some(inner)) = (id, owner.upgrade()) {
                    NormalizedRef { inner }.off(event, id);
                }
                handler(snap);
            }
        };
        let id = self.on(event, wrapper, cancel);
        if fired.load(Ordering::SeqCst) {
            self.off(event, id);
        } else {
            *registered.lock().unwrap() = Some(id);
        }
        id
    }

    /// Removes the registration `id` for `event`. The last removal
    /// unsubscribes from the backing locations.
    pub fn off(&self, event: EventType, id: ListenerId) {
        let idle = {
            let mut state = self.inner.state.lock().unwrap();
            state
                .observers
                .retain(|obs| !(obs.id == id && obs.event == event));
            if state.observers.is_empty() {
                state.last = None;
                true
            } else {
                false
            }
        };
        tracing::debug!(listener = %id, %event, url = %self.url(), "Observer removed");
        if idle {
            self.inner.sync.stop();
        }
    }

    /// Removes every registration for `event`, or every registration at all.
    pub fn off_all(&self, event: Option<EventType>) {
        let idle = {
            let mut state = self.inner.state.lock().unwrap();
            state
                .observers
                .retain(|obs| event.is_some_and(|event| obs.event != event));
            if state.observers.is_empty() {
                state.last = None;
                true
            } else {
                false
            }
        };
        if idle {
            self.inner.sync.stop();
        }
    }

    /// Whether the backing locations are currently subscribed.
    pub fn is_listening(&self) -> bool {
        self.inner.sync.is_active()
    }

    fn snapshot(&self, snaps: Vec<Snapshot>) -> Option<NormalizedSnapshot> {
        match NormalizedSnapshot::new(self.clone(), snaps) {
            Ok(snap) => Some(snap),
            Err(err) => {
                tracing::warn!(url = %self.url(), error = %err, "Failed to merge snapshots");
                None
            }
        }
    }

    fn is_registered(&self, id: ListenerId) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .observers
            .iter()
            .any(|obs| obs.id == id)
    }

    fn initial_delivery(
        &self,
        id: ListenerId,
        event: EventType,
        handler: &NormalizedHandler,
        snap: &NormalizedSnapshot,
    ) {
        match event {
            EventType::Value => handler(snap),
            EventType::ChildAdded => {
                let _ = snap.for_each(|child| {
                    if !self.is_registered(id) {
                        return true;
                    }
                    handler(&child);
                    false
                });
            }
            EventType::ChildChanged | EventType::ChildRemoved => {}
        }
    }

    /// Delivers one merged emission to every observer: child events first,
    /// then the value.
    fn emit(&self, snaps: &[Snapshot]) {
        let (previous, observers) = {
            let mut state = self.inner.state.lock().unwrap();
            let previous = state.last.replace(snaps.to_vec());
            let observers: Vec<(ListenerId, EventType, NormalizedHandler)> = state
                .observers
                .iter()
                .map(|obs| (obs.id, obs.event, obs.handler.clone()))
                .collect();
            (previous, observers)
        };
        let Some(current) = self.snapshot(snaps.to_vec()) else {
            return;
        };
        let before = previous.and_then(|snaps| self.snapshot(snaps));
        tracing::debug!(url = %self.url(), observers = observers.len(), "Emitting merged snapshot");

        let null = Value::Null;
        let changes = diff_children(
            before.as_ref().map_or(&null, NormalizedSnapshot::value),
            current.value(),
        );
        for (event, key) in changes {
            let source = match event {
                EventType::ChildRemoved => before.as_ref(),
                _ => Some(&current),
            };
            let Some(child) = source.and_then(|snap| snap.child(&key).ok()) else {
                continue;
            };
            for (id, _, handler) in observers.iter().filter(|(_, e, _)| *e == event) {
                if self.is_registered(*id) {
                    handler(&child);
                }
            }
        }
        for (id, _, handler) in observers.iter().filter(|(_, e, _)| *e == EventType::Value) {
            if self.is_registered(*id) {
                handler(&current);
            }
        }
    }

    fn cancel_all(&self, err: StoreError) {
        let observers = {
            let mut state = self.inner.state.lock().unwrap();
            state.last = None;
            std::mem::take(&mut state.observers)
        };
        tracing::warn!(url = %self.url(), error = %err, "Subscription cancelled");
        self.inner.sync.stop();
        for observer in observers {
            if let Some(cancel) = observer.cancel {
                cancel(err.clone());
            }
        }
    }
}

impl PartialEq for NormalizedRef {
    fn eq(&self, other: &Self) -> bool {
        self.url() == other.url()
    }
}

impl Eq for NormalizedRef {}

impl fmt::Display for NormalizedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl fmt::Debug for NormalizedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedRef")
            .field("record", &self.record().kind())
            .field("url", &self.url())
            .field("listening", &self.is_listening())
            .finish()
    }
}
