//! Scoped access to a store from view code.
//!
//! [`create_store`] returns a provider/accessor pair. The provider installs
//! its store on the current thread for the duration of a scope; the
//! accessor looks it up from inside that scope.
//!
//! Providers nest: the innermost active provider of a given store wins,
//! and providers of different stores do not interfere. Each provider
//! installation is undone when its guard drops, including on panic.
//!
//! ```
//! use flux_store::{create_store, ReadSettings};
//! use serde_json::json;
//!
//! let (provider, use_store) = create_store(json!({"count": 1}));
//! provider.provide(|| {
//!     let handle = use_store.use_store();
//!     let binding = handle.bind(|_| {});
//!     let count = binding.read(Some("count"), &ReadSettings::default());
//!     assert_eq!(count.unwrap().as_f64(), Some(1.0));
//! });
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::trace;

use crate::binding::Binding;
use crate::config::WriteSettings;
use crate::error::StoreError;
use crate::observer::Change;
use crate::store::Store;
use crate::value::Value;

thread_local! {
    /// Active providers, innermost last, each tagged with its guard's entry id.
    static PROVIDERS: RefCell<Vec<(u64, Arc<Store>)>> = const { RefCell::new(Vec::new()) };
}

static NEXT_ENTRY: AtomicU64 = AtomicU64::new(1);

/// Create an isolated store and the pair used to reach it from views.
pub fn create_store(initial: impl Into<Value>) -> (StoreProvider, UseStore) {
    let store = Arc::new(Store::new(initial));
    (
        StoreProvider {
            store: store.clone(),
            mounted: Arc::new(AtomicBool::new(false)),
        },
        UseStore { store },
    )
}

/// Makes a store reachable to the [`UseStore`] created with it.
///
/// The first time it is entered, every observer already registered on the
/// store is refreshed.
#[derive(Clone)]
pub struct StoreProvider {
    store: Arc<Store>,
    mounted: Arc<AtomicBool>,
}

impl StoreProvider {
    /// Run `f` with the store provided.
    pub fn provide<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// Provide the store until the returned guard drops.
    pub fn enter(&self) -> ProviderGuard {
        let entry = NEXT_ENTRY.fetch_add(1, Ordering::Relaxed);
        PROVIDERS.with(|stack| stack.borrow_mut().push((entry, self.store.clone())));
        trace!(entry, "context: provider entered");
        if !self.mounted.swap(true, Ordering::AcqRel) {
            self.store.refresh_all();
        }
        ProviderGuard {
            entry,
            _not_send: PhantomData,
        }
    }

    /// The store this provider makes reachable.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

/// Removes the provider entry pushed by [`StoreProvider::enter`].
///
/// Guards may drop in any order; each removes only its own entry. Not
/// `Send`: it must drop on the thread that created it.
pub struct ProviderGuard {
    entry: u64,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ProviderGuard {
    fn drop(&mut self) {
        PROVIDERS.with(|stack| {
            let mut stack = stack.borrow_mut();
            let position = stack.iter().rposition(|(entry, _)| *entry == self.entry);
            debug_assert!(position.is_some(), "provider entry already removed");
            if let Some(position) = position {
                stack.remove(position);
            }
        });
        trace!(entry = self.entry, "context: provider exited");
    }
}

/// Looks up the store of its pair from inside a provider scope.
#[derive(Clone)]
pub struct UseStore {
    store: Arc<Store>,
}

impl UseStore {
    /// The handle for the innermost active provider of this store.
    pub fn try_use(&self) -> Result<StoreHandle, StoreError> {
        let provided = PROVIDERS.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|(_, store)| Arc::ptr_eq(store, &self.store))
                .map(|(_, store)| store.clone())
        });
        provided
            .map(|store| StoreHandle { store })
            .ok_or(StoreError::MissingContext)
    }

    /// Like [`try_use`](Self::try_use), but panics outside a provider scope.
    pub fn use_store(&self) -> StoreHandle {
        match self.try_use() {
            Ok(handle) => handle,
            Err(err) => panic!("{err}"),
        }
    }
}

/// What a view gets from [`UseStore`]: a way to bind reads and to write.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<Store>,
}

impl StoreHandle {
    /// Create a binding whose observers call `callback`.
    pub fn bind<F>(&self, callback: F) -> Binding
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        Binding::new(self.store.clone(), callback)
    }

    /// Forwards to [`Store::write`].
    pub fn write(&self, value: impl Into<Value>, selector: Option<&str>, settings: &WriteSettings) {
        self.store.write(value, selector, settings);
    }

    /// Forwards to [`Store::write_with`].
    pub fn write_with<F>(&self, updater: F, selector: Option<&str>, settings: &WriteSettings)
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        self.store.write_with(updater, selector, settings);
    }

    /// The provided store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}
