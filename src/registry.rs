//! Per-thread engine handles
//!
//! Handles live in thread-local storage keyed by registry, so a handle can
//! only ever be reached from the thread that created it. The registry keeps a
//! shared map of live handles for bookkeeping; that map is the only state
//! touched by more than one thread.
//!
//! A handle is closed when its thread calls [`HandleRegistry::release`] or,
//! failing that, when the thread exits and its thread-local storage is
//! destroyed. Slots left behind by a dropped registry are closed the next
//! time their thread touches any registry.

use crate::engine::{Engine, EngineFactory};
use crate::error::{EngineError, Result, SegregationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, error};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

type LiveMap = Mutex<HashMap<ThreadId, HandleInfo>>;

thread_local! {
    static SLOTS: RefCell<HashMap<u64, Slot>> = RefCell::new(HashMap::new());
}

/// Bookkeeping for one live handle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandleInfo {
    /// Debug form of the owning thread's id
    pub thread: String,

    pub thread_name: Option<String>,

    pub created_at: DateTime<Utc>,
}

enum SlotState {
    Live(Box<dyn Engine>),
    /// Creation failed; the failure is remembered until an explicit release
    Failed,
    Closed,
}

struct Slot {
    state: SlotState,
    thread: ThreadId,
    live: Weak<LiveMap>,
}

impl Slot {
    fn close(&mut self) -> std::result::Result<bool, EngineError> {
        let state = std::mem::replace(&mut self.state, SlotState::Closed);
        if let Some(live) = self.live.upgrade() {
            lock(&live).remove(&self.thread);
        }
        match state {
            SlotState::Live(mut engine) => engine.close().map(|()| true),
            SlotState::Failed | SlotState::Closed => Ok(false),
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        match self.close() {
            Ok(true) => debug!("Dropped engine handle for {:?}", self.thread),
            Ok(false) => {}
            Err(e) => error!("Failed to close engine handle for {:?}: {e}", self.thread),
        }
    }
}

/// Close slots whose registry has been dropped
fn prune(slots: &mut HashMap<u64, Slot>) {
    let before = slots.len();
    slots.retain(|_, slot| slot.live.strong_count() > 0);
    let pruned = before - slots.len();
    if pruned > 0 {
        debug!("Pruned {pruned} engine handles of dropped registries");
    }
}

fn lock(live: &LiveMap) -> MutexGuard<'_, HashMap<ThreadId, HandleInfo>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Maps each calling thread to its own engine handle.
///
/// Dropping the registry closes the dropping thread's handle only. Handles it
/// created on other threads are closed when those threads exit, or earlier,
/// the next time those threads call into any `HandleRegistry`.
pub struct HandleRegistry {
    id: u64,
    factory: Arc<dyn EngineFactory>,
    live: Arc<LiveMap>,
}

impl HandleRegistry {
    pub fn new(factory: impl EngineFactory + 'static) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            factory: Arc::new(factory),
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `f` against the calling thread's handle, creating it on first use.
    ///
    /// A creation failure is returned as [`SegregationError::Initialization`]
    /// and cached: later calls on the same thread receive `None` instead of a
    /// new attempt, until [`release`](Self::release) clears it. Calling back
    /// into any registry from inside `f` fails with
    /// [`SegregationError::HandleUnavailable`].
    pub fn with_handle<R>(&self, f: impl FnOnce(Option<&mut dyn Engine>) -> Result<R>) -> Result<R> {
        SLOTS
            .try_with(|slots| {
                let mut slots = slots.try_borrow_mut().map_err(|_| {
                    SegregationError::HandleUnavailable("handle is already in use on this thread")
                })?;
                prune(&mut slots);

                if !slots.contains_key(&self.id) {
                    let (slot, created) = self.create_slot();
                    slots.insert(self.id, slot);
                    created?;
                }

                let slot = slots
                    .get_mut(&self.id)
                    .ok_or(SegregationError::HandleUnavailable("handle vanished"))?;
                match &mut slot.state {
                    SlotState::Live(engine) => {
                        let engine: &mut dyn Engine = engine.as_mut();
                        f(Some(engine))
                    }
                    SlotState::Failed | SlotState::Closed => f(None),
                }
            })
            .map_err(|_| SegregationError::HandleUnavailable("thread is shutting down"))?
    }

    fn create_slot(&self) -> (Slot, Result<()>) {
        let current = thread::current();
        let mut slot = Slot {
            state: SlotState::Failed,
            thread: current.id(),
            live: Arc::downgrade(&self.live),
        };

        match self.factory.create() {
            Ok(engine) => {
                let info = HandleInfo {
                    thread: format!("{:?}", current.id()),
                    thread_name: current.name().map(str::to_string),
                    created_at: Utc::now(),
                };
                lock(&self.live).insert(current.id(), info);
                debug!("Created engine handle for {:?}", current.id());
                slot.state = SlotState::Live(engine);
                (slot, Ok(()))
            }
            Err(e) => {
                error!("Failed to create engine handle for {:?}: {e}", current.id());
                (slot, Err(SegregationError::Initialization(e.to_string())))
            }
        }
    }

    /// Close the calling thread's handle and forget it.
    ///
    /// Returns whether a live handle was closed. Also clears a cached
    /// creation failure, so the next call on this thread tries again.
    pub fn release(&self) -> Result<bool> {
        let slot = SLOTS
            .try_with(|slots| {
                slots.try_borrow_mut().ok().and_then(|mut slots| {
                    prune(&mut slots);
                    slots.remove(&self.id)
                })
            })
            .ok()
            .flatten();

        let Some(mut slot) = slot else {
            return Ok(false);
        };
        let closed = slot.close().map_err(|source| SegregationError::Invocation {
            operation: "close",
            source,
        })?;
        if closed {
            debug!("Released engine handle for {:?}", slot.thread);
        }
        Ok(closed)
    }

    /// Whether the calling thread currently owns a live handle
    #[must_use]
    pub fn has_handle(&self) -> bool {
        SLOTS
            .try_with(|slots| {
                slots.try_borrow().is_ok_and(|slots| {
                    matches!(
                        slots.get(&self.id).map(|s| &s.state),
                        Some(SlotState::Live(_))
                    )
                })
            })
            .unwrap_or(false)
    }

    /// Number of threads that currently own a live handle
    #[must_use]
    pub fn live_handles(&self) -> usize {
        lock(&self.live).len()
    }

    /// Live handles, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<HandleInfo> {
        let mut handles: Vec<HandleInfo> = lock(&self.live).values().cloned().collect();
        handles.sort_by_key(|h| h.created_at);
        handles
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("{e}");
        }
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("id", &self.id)
            .field("live_handles", &self.live_handles())
            .finish_non_exhaustive()
    }
}
