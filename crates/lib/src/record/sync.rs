//! Keeps a record's merged view current across its backing locations.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::path::Path;
use crate::store::{CancelHandler, EventType, ListenerId, Snapshot, StoreError};

/// Receives one snapshot per backing path, in path order.
pub type MergeHandler = Arc<dyn Fn(&[Snapshot]) + Send + Sync>;

/// Receives the first subscription failure of a run.
pub type SyncCancelHandler = Arc<dyn Fn(StoreError) + Send + Sync>;

#[derive(Default)]
struct SyncState {
    buffered: Vec<Option<Snapshot>>,
    registrations: Vec<(usize, ListenerId)>,
    active: bool,
    cancelled: bool,
    /// Bumped by every start so deliveries from an earlier run are ignored
    generation: u64,
}

impl SyncState {
    fn is_current(&self, generation: u64) -> bool {
        self.active && self.generation == generation
    }
}

/// Subscribes to each backing path and re-emits all of them together.
///
/// The first emission waits until every path has delivered once, so callers
/// never see a merged view built from partially loaded locations. Stores
/// deliver the current value on registration, which releases the barrier as
/// soon as every path is subscribed. After that every delivery from any path
/// emits again, pairing the new snapshot with the latest buffered snapshot of
/// every other path; there is no ordering between locations.
pub struct Synchronizer {
    paths: Vec<Path>,
    on_merge: MergeHandler,
    on_cancel: Option<SyncCancelHandler>,
    state: Arc<Mutex<SyncState>>,
}

impl Synchronizer {
    pub fn new(
        paths: Vec<Path>,
        on_merge: MergeHandler,
        on_cancel: Option<SyncCancelHandler>,
    ) -> Self {
        Self {
            paths,
            on_merge,
            on_cancel,
            state: Arc::new(Mutex::new(SyncState::default())),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    /// The latest snapshot of every path, once all have delivered.
    pub fn latest(&self) -> Option<Vec<Snapshot>> {
        let state = self.state.lock().unwrap();
        if !state.active {
            return None;
        }
        state.buffered.iter().cloned().collect()
    }

    /// Registers one value listener per path. Calling it while running does
    /// nothing.
    pub fn start(&self) {
        let generation = {
            let mut state = self.state.lock().unwrap();
            if state.active {
                return;
            }
            state.active = true;
            state.cancelled = false;
            state.generation += 1;
            state.buffered = vec![None; self.paths.len()];
            state.registrations.clear();
            state.generation
        };
        tracing::debug!(paths = self.paths.len(), generation, "Starting synchronizer");

        for (index, path) in self.paths.iter().enumerate() {
            let weak = Arc::downgrade(&self.state);
            let on_merge = self.on_merge.clone();
            let handler = Arc::new(move |snap: &Snapshot| {
                deliver(&weak, generation, index, snap, &on_merge);
            });
            let cancel = self.cancel_handler(generation, path.url().to_string());

            let id = path.reference().on(EventType::Value, handler, Some(cancel));

            // The store may deliver synchronously, and a handler may stop us
            // before `on` returns.
            let still_running = {
                let mut state = self.state.lock().unwrap();
                let current = state.is_current(generation);
                if current {
                    state.registrations.push((index, id));
                }
                current
            };
            if !still_running {
                path.reference().off(EventType::Value, id);
                return;
            }
        }
    }

    /// Removes exactly the registrations made by the last `start` and drops
    /// buffered snapshots.
    pub fn stop(&self) {
        let registrations = {
            let mut state = self.state.lock().unwrap();
            if !state.active {
                return;
            }
            state.active = false;
            state.buffered.clear();
            std::mem::take(&mut state.registrations)
        };
        tracing::debug!(registrations = registrations.len(), "Stopping synchronizer");
        for (index, id) in registrations {
            self.paths[index].reference().off(EventType::Value, id);
        }
    }

    fn cancel_handler(&self, generation: u64, location: String) -> CancelHandler {
        let weak = Arc::downgrade(&self.state);
        let on_cancel = self.on_cancel.clone();
        Box::new(move |err: StoreError| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let first = {
                let mut state = state.lock().unwrap();
                let first = state.is_current(generation) && !state.cancelled;
                state.cancelled = true;
                first
            };
            tracing::warn!(%location, error = %err, "Subscription cancelled");
            if first {
                if let Some(on_cancel) = on_cancel {
                    on_cancel(err);
                }
            }
        })
    }
}

fn deliver(
    state: &Weak<Mutex<SyncState>>,
    generation: u64,
    index: usize,
    snap: &Snapshot,
    on_merge: &MergeHandler,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let ready: Option<Vec<Snapshot>> = {
        let mut state = state.lock().unwrap();
        if !state.is_current(generation) {
            return;
        }
        state.buffered[index] = Some(snap.clone());
        state.buffered.iter().cloned().collect()
    };
    if let Some(snaps) = ready {
        on_merge(&snaps);
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("paths", &self.paths)
            .field("active", &self.is_active())
            .finish()
    }
}
