use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::observer::{Gate, Observer, Update};
use crate::value::Value;

/// Unique handle for a registration, returned by [`Registry::register`].
///
/// Pass it to [`Registry::unsubscribe`] to dispose the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// The set of active observers of one store.
///
/// `notify` works on a copy of the observer set taken when it starts, and
/// holds no lock while callbacks run: a callback may read the store, write
/// to it (re-entering `notify`) or dispose observers. An observer disposed
/// during a pass is skipped if the pass has not reached it yet.
pub struct Registry {
    observers: RwLock<BTreeMap<SubscriptionId, Arc<Observer>>>,
    next_id: AtomicU64,
}

impl Registry {
    /// An empty registry; ids start at 1.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add an observer. The returned id disposes it.
    pub fn register(&self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(observer));
        id
    }

    /// Remove an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(observer) => {
                observer.deactivate();
                true
            }
            None => false,
        }
    }

    /// Gate `update` for every registered observer against `snapshot` and
    /// fire the relevant ones. Returns the number of callbacks invoked.
    ///
    /// `generation` orders snapshots: an observer that already handled a
    /// newer one skips this pass. Observers are visited in registration
    /// order; each fires at most once per call.
    pub fn notify(&self, update: &Update, snapshot: &Value, generation: u64) -> usize {
        let observers: Vec<Arc<Observer>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let fired = observers
            .iter()
            .filter(|observer| observer.dispatch(update, snapshot, generation) == Gate::Fire)
            .count();
        debug!(
            selector = ?update.selector,
            forced = update.forced,
            generation,
            observers = observers.len(),
            fired,
            "registry: notified"
        );
        fired
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
