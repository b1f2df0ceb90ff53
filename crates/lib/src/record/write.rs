//! Aggregation of per-location write completions.

use std::sync::{Arc, Mutex};

use crate::store::{Completion, StoreError};

struct BatchState {
    remaining: usize,
    callback: Option<Completion>,
}

/// Joins the completions of several physical writes into one callback.
///
/// The callback fires exactly once: with `Ok` after every constituent write
/// succeeded, or with the first failure as soon as it is reported. Partial
/// effects of the other writes are left in place.
#[derive(Clone)]
pub(crate) struct WriteBatch {
    state: Arc<Mutex<BatchState>>,
}

impl WriteBatch {
    pub(crate) fn new(writes: usize, callback: Option<Completion>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BatchState {
                remaining: writes,
                callback,
            })),
        }
    }

    /// Completion for one constituent write to `location`.
    pub(crate) fn completion(&self, location: String) -> Completion {
        let state = self.state.clone();
        Box::new(move |result: Result<(), StoreError>| {
            let fire = {
                let mut state = state.lock().unwrap();
                match result {
                    Err(err) => {
                        tracing::warn!(%location, error = %err, "Constituent write failed");
                        state.callback.take().map(|cb| (cb, Err(err)))
                    }
                    Ok(()) => {
                        state.remaining = state.remaining.saturating_sub(1);
                        if state.remaining == 0 {
                            state.callback.take().map(|cb| (cb, Ok(())))
                        } else {
                            None
                        }
                    }
                }
            };
            if let Some((callback, result)) = fire {
                callback(result);
            }
        })
    }
}
