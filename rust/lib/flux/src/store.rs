use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::config::{ReadSettings, StoreConfig, WriteSettings};
use crate::equality::{deep_clone, ref_equal};
use crate::observer::{Change, Observer, Update};
use crate::path::{self, Input};
use crate::registry::{Registry, SubscriptionId};
use crate::value::{Map, Value};

/// A single snapshot with gated change notification.
///
/// - `get(selector)` reads the current value at a dot-path selector.
/// - `subscribe(selector, settings, handler)` registers an observer.
/// - `write(value, selector, settings)` replaces the value at a selector,
///   swaps in the new snapshot and notifies the observers the write may
///   concern.
/// - `unsubscribe(id)` removes an observer.
///
/// Every successful write produces a new root: the containers on the path
/// to the written selector are copied, everything else is shared with the
/// previous snapshot. Notification is synchronous and runs on the writing
/// thread after the snapshot swap.
///
/// A store created from `Null` starts from an empty map, so keyed writes
/// land.
pub struct Store {
    snapshot: RwLock<Value>,
    /// Bumped with every swap, under the snapshot write lock.
    generation: AtomicU64,
    registry: Registry,
    config: StoreConfig,
    /// Serializes read-modify-swap; released before notification.
    write_guard: Mutex<()>,
}

impl Store {
    pub fn new(initial: impl Into<Value>) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    pub fn with_config(initial: impl Into<Value>, config: StoreConfig) -> Self {
        let root = match initial.into() {
            Value::Null => Value::Map(Map::new()),
            root => root,
        };
        Self {
            snapshot: RwLock::new(root),
            generation: AtomicU64::new(0),
            registry: Registry::new(),
            config,
            write_guard: Mutex::new(()),
        }
    }

    /// Store-wide defaults this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The current root. A handle, not a copy.
    pub fn snapshot(&self) -> Value {
        self.current().0
    }

    /// Number of snapshot swaps so far.
    pub fn generation(&self) -> u64 {
        self.current().1
    }

    /// The current root together with its generation, read consistently.
    fn current(&self) -> (Value, u64) {
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        (snapshot.clone(), self.generation.load(Ordering::Acquire))
    }

    /// Read the value at `selector` without subscribing.
    ///
    /// `None` if the path does not resolve.
    pub fn get(&self, selector: Option<&str>) -> Option<Value> {
        path::get(&self.snapshot(), selector)
    }

    /// Register an observer at `selector`.
    ///
    /// The observer remembers the current value at `selector` and, on each
    /// later write, calls `handler` if the write passes its gates.
    pub fn subscribe<F>(&self, selector: Option<&str>, settings: &ReadSettings, handler: F) -> SubscriptionId
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        let (snapshot, generation) = self.current();
        let observer = Observer::new(
            selector,
            settings,
            self.config.comparison,
            Arc::new(handler),
            &snapshot,
        )
        .at_generation(generation);
        self.registry.register(observer)
    }

    /// Remove an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Whether the observer `id` is still registered.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.registry.contains(id)
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.registry.len()
    }

    /// Store `value` at `selector` (the whole snapshot if `None`).
    ///
    /// A selector whose intermediate segment is missing is a no-op: the
    /// snapshot is kept and nobody is notified.
    pub fn write(&self, value: impl Into<Value>, selector: Option<&str>, settings: &WriteSettings) {
        self.apply(Input::Value(value.into()), selector, settings);
    }

    /// Store the result of `updater` applied to the previous value at
    /// `selector` (`None` if there was none).
    ///
    /// The updater runs while the write guard is held and must not write to
    /// this store.
    pub fn write_with<F>(&self, updater: F, selector: Option<&str>, settings: &WriteSettings)
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        self.apply(Input::updater(updater), selector, settings);
    }

    /// Notify observers of `update` against the current snapshot. Returns
    /// the number of callbacks invoked.
    pub fn notify(&self, update: &Update) -> usize {
        let (snapshot, generation) = self.current();
        self.registry.notify(update, &snapshot, generation)
    }

    /// Force every observer to fire.
    pub fn refresh_all(&self) -> usize {
        self.notify(&Update::refresh_all())
    }

    fn apply(&self, input: Input<'_>, selector: Option<&str>, settings: &WriteSettings) {
        let selector = path::normalize(selector);
        let immutable = settings.immutable.unwrap_or(self.config.immutable);
        let input = if immutable { isolate(input) } else { input };

        let (next, generation) = {
            let _guard = self.write_guard.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.snapshot();
            let next = match path::fork(&current, selector)
                .and_then(|forked| path::try_set(&forked, selector, input))
            {
                Ok(next) => next,
                Err(err) => {
                    warn!("store: write skipped: {}", err);
                    return;
                }
            };
            // A whole-store write may hand back the current root itself.
            let next = if ref_equal(&next, &current) {
                path::copy_container(&next)
            } else {
                next
            };
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            *snapshot = next.clone();
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            (next, generation)
        };

        debug!(selector = ?selector, immutable, generation, "store: snapshot replaced");
        if settings.notify {
            self.registry.notify(
                &Update::new(selector, settings.force_rerender),
                &next,
                generation,
            );
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Map::new())
    }
}

/// Wrap `input` so that the stored value shares nothing with the caller
/// and an updater never sees live snapshot data.
fn isolate(input: Input<'_>) -> Input<'_> {
    match input {
        Input::Value(value) => Input::Value(deep_clone(&value)),
        Input::Updater(f) => Input::updater(move |previous| {
            let previous = previous.map(|p| deep_clone(&p));
            deep_clone(&f(previous))
        }),
    }
}
