use std::sync::{Arc, Mutex, PoisonError};

use crate::config::ReadSettings;
use crate::observer::{Change, ChangeHandler};
use crate::registry::SubscriptionId;
use crate::store::Store;
use crate::value::Value;

/// One view's connection to a store.
///
/// Each `read` replaces the binding's registration with a fresh observer
/// at the new selector, so a view that reads again on every render keeps
/// exactly one live observer. The registration is removed on `dispose` or
/// drop.
pub struct Binding {
    store: Arc<Store>,
    handler: ChangeHandler,
    current: Mutex<Option<SubscriptionId>>,
}

impl Binding {
    /// A binding with no registration yet; the first `read` creates one.
    pub fn new<F>(store: Arc<Store>, handler: F) -> Self
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        Self {
            store,
            handler: Arc::new(handler),
            current: Mutex::new(None),
        }
    }

    /// Read the value at `selector` and (re)subscribe to it.
    pub fn read(&self, selector: Option<&str>, settings: &ReadSettings) -> Option<Value> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = current.take() {
            self.store.unsubscribe(id);
        }

        let handler = self.handler.clone();
        let id = self
            .store
            .subscribe(selector, settings, move |change| handler(change));
        *current = Some(id);
        drop(current);

        self.store.get(selector)
    }

    /// Id of the live registration, if any.
    pub fn subscription(&self) -> Option<SubscriptionId> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the live registration, if any.
    pub fn dispose(&self) {
        let id = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            self.store.unsubscribe(id);
        }
    }

    /// The store this binding reads from.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.dispose();
    }
}
