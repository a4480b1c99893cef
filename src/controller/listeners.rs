//! Callback registry shared between the monitor thread and its users
//!
//! The entry list is moved out of the lock while callbacks run, so a
//! callback may add or clear listeners without deadlocking. A clear bumps
//! the generation counter; dispatch notices it, stops invoking the rest of
//! the snapshot and drops it instead of merging it back.

use super::event_monitor::{EventKind, RawInputEvent};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// What a listener wants after handling an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerDisposition {
    Retain,
    Disarm,
}

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type ListenerResult = Result<ListenerDisposition, ListenerError>;

type Callback = Box<dyn FnMut(&RawInputEvent) -> ListenerResult + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    kind: EventKind,
    callback: Callback,
}

#[derive(Default)]
struct RegistryInner {
    entries: Mutex<Vec<Entry>>,
    generation: AtomicU64,
    next_id: AtomicU64,
}

/// Cloneable handle to the listener list of one monitor
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_listener<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&RawInputEvent) -> ListenerResult + Send + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push(Entry {
            id,
            kind,
            callback: Box::new(callback),
        });
        debug!("Registered listener {:?} for {:?}", id, kind);
        id
    }

    pub fn clear_listeners(&self) {
        let mut entries = self.entries();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        debug!("Clearing {} listeners", entries.len());
        entries.clear();
    }

    /// Listeners currently parked in the registry (not counting a snapshot
    /// that is being dispatched).
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every listener registered for the event's kind, in registration
    /// order. Returns how many were invoked.
    pub fn dispatch(&self, event: &RawInputEvent) -> usize {
        let kind = event.kind();
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let mut snapshot = std::mem::take(&mut *self.entries());
        let mut invoked = 0;

        snapshot.retain_mut(|entry| {
            if entry.kind != kind {
                return true;
            }
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(event))) {
                Ok(Ok(ListenerDisposition::Retain)) => true,
                Ok(Ok(ListenerDisposition::Disarm)) => {
                    debug!("Listener {:?} disarmed", entry.id);
                    false
                }
                Ok(Err(e)) => {
                    warn!("Listener {:?} failed on {:?}: {}", entry.id, kind, e);
                    true
                }
                Err(_) => {
                    error!("Listener {:?} panicked on {:?}", entry.id, kind);
                    true
                }
            }
        });

        let mut entries = self.entries();
        if self.inner.generation.load(Ordering::SeqCst) == generation {
            let added_meanwhile = std::mem::take(&mut *entries);
            *entries = snapshot;
            entries.extend(added_meanwhile);
        }
        invoked
    }
}
