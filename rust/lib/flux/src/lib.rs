//! Flux store: a single-snapshot state container with selective
//! notification.
//!
//! The whole application state lives in one tree of [`Value`]s. Views read
//! parts of it through dot-path selectors and are told about later writes
//! only when those writes can concern them.
//!
//! # Primitives
//!
//! - `get(selector)`: read the value at a selector
//! - `write(value, selector, settings)`: replace it, producing a new snapshot
//! - `subscribe(selector, settings, handler)`: observe a selector
//!
//! # Selectors
//!
//! Dot-separated segments from the root; list items by index:
//! - `user.name`
//! - `todos.0.done`
//! - absent or empty: the whole snapshot
//!
//! # Gating
//!
//! A write at selector `W` reaches an observer at base `B` only when `W`
//! and `B` lie on one root-to-leaf path, the observer's pattern filters
//! accept `W`, and the value at `B` actually changed. Patterns use `*` for
//! one segment and a trailing `**` for any number of trailing segments. A
//! forced write skips change detection; a forced whole-store write reaches
//! every observer.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use flux_store::{ReadSettings, Store, WriteSettings};
//! use serde_json::json;
//!
//! let store = Arc::new(Store::new(json!({"user": {"name": "ada"}, "count": 0})));
//!
//! store.subscribe(Some("user"), &ReadSettings::default(), |change| {
//!     println!("user changed by write at {:?}", change.selector);
//! });
//!
//! // Fires: `user.name` is under `user` and the value changed.
//! store.write("grace", Some("user.name"), &WriteSettings::default());
//! // Skipped: `count` is unrelated to `user`.
//! store.write(1, Some("count"), &WriteSettings::default());
//! ```

pub mod binding;
pub mod config;
pub mod context;
pub mod equality;
pub mod error;
pub mod observer;
pub mod path;
pub mod pattern;
pub mod registry;
pub mod store;
pub mod value;

// Re-export primary types at crate root.
pub use binding::Binding;
pub use config::{ReadSettings, StoreConfig, WriteSettings};
pub use context::{ProviderGuard, StoreHandle, StoreProvider, UseStore, create_store};
pub use equality::{Comparison, deep_clone, deep_equal, ref_equal};
pub use error::StoreError;
pub use observer::{Change, ChangeHandler, Gate, Update};
pub use pattern::{Pattern, PatternSet};
pub use registry::SubscriptionId;
pub use store::Store;
pub use value::{List, Map, Value};
