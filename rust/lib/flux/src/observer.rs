use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::config::ReadSettings;
use crate::equality::Comparison;
use crate::path;
use crate::pattern::{self, PatternSet};
use crate::value::Value;

/// Callback invoked when an observer decides a write is relevant.
pub type ChangeHandler = Arc<dyn Fn(&Change) + Send + Sync>;

/// A write as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Written selector, `None` for a whole-store write.
    pub selector: Option<String>,
    pub forced: bool,
}

impl Update {
    pub fn new(selector: Option<&str>, forced: bool) -> Self {
        Self {
            selector: path::normalize(selector).map(str::to_string),
            forced,
        }
    }

    /// Forced whole-store update: every observer fires.
    pub fn refresh_all() -> Self {
        Self::new(None, true)
    }
}

/// What an observer's callback receives.
#[derive(Debug, Clone)]
pub struct Change {
    /// Selector of the write that triggered the notification.
    pub selector: Option<String>,
    pub forced: bool,
    /// Current value at the observer's base selector.
    pub value: Option<Value>,
}

/// Outcome of gating one write for one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Fire,
    /// Removed from the registry earlier in the same pass.
    Disposed,
    /// Write selector is neither an ancestor, a descendant nor equal to the
    /// base selector.
    Unrelated,
    /// Not matched by `observed_selectors`.
    NotObserved,
    /// Matched by `ignored_selectors`.
    Ignored,
    /// `observe_changes` is off and the write is not forced.
    Muted,
    /// Value at the base selector did not change.
    Unchanged,
    /// Carries an older snapshot than one this observer already saw.
    Stale,
}

/// A registered interest in a part of the snapshot.
///
/// Holds the base selector, the compiled pattern filters and the value last
/// seen at the base selector, used for change detection.
pub struct Observer {
    base: Option<String>,
    observed: Option<PatternSet>,
    ignored: Option<PatternSet>,
    observe_changes: bool,
    comparison: Comparison,
    handler: ChangeHandler,
    last: Mutex<Seen>,
    active: AtomicBool,
}

/// Last value seen at the base selector and the snapshot generation it
/// was seen in.
struct Seen {
    value: Option<Value>,
    generation: u64,
}

impl Observer {
    /// `default_comparison` applies unless `settings` picks one; `snapshot`
    /// is the snapshot the observer starts from.
    pub fn new(
        base: Option<&str>,
        settings: &ReadSettings,
        default_comparison: Comparison,
        handler: ChangeHandler,
        snapshot: &Value,
    ) -> Self {
        let base = path::normalize(base).map(str::to_string);
        let comparison = settings.comparison.unwrap_or(default_comparison);
        let last = current_at(snapshot, base.as_deref()).map(|v| comparison.remember(&v));
        Self {
            base,
            observed: settings.observed_selectors.as_ref().map(PatternSet::new),
            ignored: settings.ignored_selectors.as_ref().map(PatternSet::new),
            observe_changes: settings.observe_changes,
            comparison,
            handler,
            last: Mutex::new(Seen {
                value: last,
                generation: 0,
            }),
            active: AtomicBool::new(true),
        }
    }

    /// Mark the starting snapshot as generation `generation`.
    pub(crate) fn at_generation(mut self, generation: u64) -> Self {
        self.last
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .generation = generation;
        self
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Decide whether `update` is relevant, without firing.
    pub fn gate(&self, update: &Update, snapshot: &Value) -> Gate {
        let seen = self.lock_last();
        self.evaluate(update, snapshot, seen.value.as_ref()).0
    }

    /// Gate `update` against `snapshot` (of generation `generation`) and,
    /// if relevant, remember the new value and invoke the callback.
    ///
    /// A generation older than the last one dispatched is dropped as
    /// [`Gate::Stale`], so concurrent writers notifying out of order never
    /// roll the cached value back.
    pub(crate) fn dispatch(&self, update: &Update, snapshot: &Value, generation: u64) -> Gate {
        let (gate, current) = {
            let mut seen = self.lock_last();
            if generation < seen.generation {
                (Gate::Stale, None)
            } else {
                seen.generation = generation;
                let (gate, current) = self.evaluate(update, snapshot, seen.value.as_ref());
                if gate == Gate::Fire {
                    // Remember before calling out: a callback that writes to
                    // the store re-enters notification and must see the new
                    // baseline.
                    seen.value = current.as_ref().map(|v| self.comparison.remember(v));
                }
                (gate, current)
            }
        };
        trace!(
            base = ?self.base,
            selector = ?update.selector,
            forced = update.forced,
            ?gate,
            "observer: gate"
        );
        if gate == Gate::Fire {
            (self.handler)(&Change {
                selector: update.selector.clone(),
                forced: update.forced,
                value: current,
            });
        }
        gate
    }

    fn evaluate(&self, update: &Update, snapshot: &Value, last: Option<&Value>) -> (Gate, Option<Value>) {
        let current = || current_at(snapshot, self.base.as_deref());

        if !self.is_active() {
            return (Gate::Disposed, None);
        }

        let selector = update.selector.as_deref();
        if update.forced && selector.is_none() {
            return (Gate::Fire, current());
        }

        if !update.forced && !self.observe_changes {
            return (Gate::Muted, None);
        }

        if let (Some(selector), Some(base)) = (selector, self.base.as_deref()) {
            if !pattern::is_related(selector, base) {
                return (Gate::Unrelated, None);
            }
        }

        if let Some(observed) = &self.observed {
            let candidate = match selector {
                Some(s) if update.forced => Some(format!("{s}.**")),
                other => other.map(str::to_string),
            };
            if !observed.matches(candidate.as_deref()) {
                return (Gate::NotObserved, None);
            }
        }

        if let Some(ignored) = &self.ignored {
            if ignored.matches(selector) {
                return (Gate::Ignored, None);
            }
        }

        let current = current();
        if !update.forced && self.comparison.unchanged(last, current.as_ref()) {
            return (Gate::Unchanged, current);
        }

        (Gate::Fire, current)
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, Seen> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn current_at(snapshot: &Value, base: Option<&str>) -> Option<Value> {
    path::resolve(snapshot, base).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU64;

    fn snapshot() -> Value {
        Value::from(json!({
            "a": {"b": 1, "c": 2},
            "x": "unrelated"
        }))
    }

    fn observer(base: Option<&str>, settings: ReadSettings, snap: &Value) -> Observer {
        Observer::new(base, &settings, Comparison::Deep, Arc::new(|_| {}), snap)
    }

    /// Apply a write the way the store does: fork, set, return new root.
    fn write(root: &Value, selector: &str, value: serde_json::Value) -> Value {
        let next = path::fork(root, Some(selector)).unwrap();
        path::try_set(&next, Some(selector), Value::from(value).into()).unwrap()
    }

    // ========================================================================
    // Relationship
    // ========================================================================

    #[test]
    fn unrelated_write_is_skipped() {
        let snap = snapshot();
        let obs = observer(Some("a"), ReadSettings::default(), &snap);
        let next = write(&snap, "x", json!("changed"));
        assert_eq!(obs.gate(&Update::new(Some("x"), false), &next), Gate::Unrelated);
    }

    #[test]
    fn descendant_write_fires() {
        let snap = snapshot();
        let obs = observer(Some("a"), ReadSettings::default(), &snap);
        let next = write(&snap, "a.b", json!(10));
        assert_eq!(obs.gate(&Update::new(Some("a.b"), false), &next), Gate::Fire);
    }

    #[test]
    fn ancestor_write_fires_only_on_change() {
        let snap = snapshot();
        let obs = observer(Some("a.b"), ReadSettings::default(), &snap);

        let same = write(&snap, "a", json!({"b": 1, "c": 99}));
        assert_eq!(obs.gate(&Update::new(Some("a"), false), &same), Gate::Unchanged);

        let changed = write(&snap, "a", json!({"b": 2, "c": 2}));
        assert_eq!(obs.gate(&Update::new(Some("a"), false), &changed), Gate::Fire);
    }

    #[test]
    fn observer_without_base_is_related_to_everything() {
        let snap = snapshot();
        let obs = observer(None, ReadSettings::default(), &snap);
        let next = write(&snap, "x", json!("changed"));
        assert_eq!(obs.gate(&Update::new(Some("x"), false), &next), Gate::Fire);
    }

    // ========================================================================
    // Observed / ignored
    // ========================================================================

    #[test]
    fn empty_observed_list_never_fires() {
        let snap = snapshot();
        let obs = observer(Some("a"), ReadSettings::default().observed(Vec::<String>::new()), &snap);
        let next = write(&snap, "a.b", json!(5));
        assert_eq!(obs.gate(&Update::new(Some("a.b"), false), &next), Gate::NotObserved);
    }

    #[test]
    fn observed_pattern_filters_writes() {
        let snap = snapshot();
        let obs = observer(Some("a"), ReadSettings::default().observed(["a.b"]), &snap);

        let next = write(&snap, "a.c", json!(5));
        assert_eq!(obs.gate(&Update::new(Some("a.c"), false), &next), Gate::NotObserved);

        let next = write(&snap, "a.b", json!(5));
        assert_eq!(obs.gate(&Update::new(Some("a.b"), false), &next), Gate::Fire);
    }

    #[test]
    fn observed_with_forced_write_tests_subtree_pattern() {
        let snap = snapshot();
        let obs = observer(Some("a"), ReadSettings::default().observed(["a.**"]), &snap);
        // Forced write at "a" is tested as "a.**", which "a.**" matches.
        assert_eq!(obs.gate(&Update::new(Some("a"), true), &snap), Gate::Fire);

        let obs = observer(Some("a"), ReadSettings::default().observed(["a"]), &snap);
        assert_eq!(obs.gate(&Update::new(Some("a"), true), &snap), Gate::NotObserved);
    }

    #[test]
    fn ignored_pattern_skips_matching_writes() {
        let snap = snapshot();
        let obs = observer(Some("a"), ReadSettings::default().ignored(["a.b"]), &snap);

        let next = write(&snap, "a.b", json!(5));
        assert_eq!(obs.gate(&Update::new(Some("a.b"), false), &next), Gate::Ignored);

        let next = write(&snap, "a.c", json!(5));
        assert_eq!(obs.gate(&Update::new(Some("a.c"), false), &next), Gate::Fire);
    }

    #[test]
    fn whole_store_write_does_not_match_observed_patterns() {
        let snap = snapshot();
        let obs = observer(None, ReadSettings::default().observed(["**"]), &snap);
        let next = Value::from(json!({"fresh": true}));
        assert_eq!(obs.gate(&Update::new(None, false), &next), Gate::NotObserved);
    }

    // ========================================================================
    // Forced updates
    // ========================================================================

    #[test]
    fn forced_whole_store_update_bypasses_every_gate() {
        let snap = snapshot();
        let settings = ReadSettings::default()
            .observed(Vec::<String>::new())
            .ignored(["**"])
            .muted();
        let obs = observer(Some("a"), settings, &snap);
        assert_eq!(obs.gate(&Update::refresh_all(), &snap), Gate::Fire);
    }

    #[test]
    fn forced_selector_update_skips_change_detection_only() {
        let snap = snapshot();
        let obs = observer(Some("a"), ReadSettings::default(), &snap);
        assert_eq!(obs.gate(&Update::new(Some("a.b"), true), &snap), Gate::Fire);
        assert_eq!(obs.gate(&Update::new(Some("x"), true), &snap), Gate::Unrelated);
    }

    #[test]
    fn muted_observer_only_reacts_to_forced_updates() {
        let snap = snapshot();
        let obs = observer(Some("a"), ReadSettings::default().muted(), &snap);
        let next = write(&snap, "a.b", json!(5));
        assert_eq!(obs.gate(&Update::new(Some("a.b"), false), &next), Gate::Muted);
        assert_eq!(obs.gate(&Update::new(Some("a.b"), true), &next), Gate::Fire);
    }

    // ========================================================================
    // Change detection
    // ========================================================================

    #[test]
    fn reference_comparison_fires_for_equal_but_new_values() {
        let snap = snapshot();
        let settings = ReadSettings::default().with_comparison(Comparison::Reference);
        let obs = observer(Some("a"), settings, &snap);

        let next = write(&snap, "a", json!({"b": 1, "c": 2}));
        assert_eq!(obs.gate(&Update::new(Some("a"), false), &next), Gate::Fire);

        let deep = observer(Some("a"), ReadSettings::default(), &snap);
        assert_eq!(deep.gate(&Update::new(Some("a"), false), &next), Gate::Unchanged);
    }

    #[test]
    fn dispatch_refreshes_cache() {
        let snap = snapshot();
        let count = Arc::new(AtomicU64::new(0));
        let count_c = count.clone();
        let obs = Observer::new(
            Some("a.b"),
            &ReadSettings::default(),
            Comparison::Deep,
            Arc::new(move |_| {
                count_c.fetch_add(1, Ordering::Relaxed);
            }),
            &snap,
        );

        let next = write(&snap, "a.b", json!(7));
        let update = Update::new(Some("a.b"), false);
        assert_eq!(obs.dispatch(&update, &next, 1), Gate::Fire);
        // Same snapshot again: nothing changed since the last fire.
        assert_eq!(obs.dispatch(&update, &next, 1), Gate::Unchanged);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dispatch_passes_change_to_handler() {
        let snap = snapshot();
        let seen = Arc::new(Mutex::new(None::<Change>));
        let seen_c = seen.clone();
        let obs = Observer::new(
            Some("a.b"),
            &ReadSettings::default(),
            Comparison::Deep,
            Arc::new(move |change| {
                *seen_c.lock().unwrap() = Some(change.clone());
            }),
            &snap,
        );

        let next = write(&snap, "a.b", json!(7));
        obs.dispatch(&Update::new(Some("a.b"), false), &next, 1);

        let change = seen.lock().unwrap().clone().unwrap();
        assert_eq!(change.selector.as_deref(), Some("a.b"));
        assert!(!change.forced);
        assert_eq!(change.value.unwrap().as_f64(), Some(7.0));
    }

    #[test]
    fn older_generation_is_dropped() {
        let snap = snapshot();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        let obs = Observer::new(
            Some("a.b"),
            &ReadSettings::default(),
            Comparison::Deep,
            Arc::new(move |change: &Change| {
                let v = change.value.as_ref().and_then(Value::as_f64);
                seen_c.lock().unwrap().push(v);
            }),
            &snap,
        );

        let older = write(&snap, "a.b", json!(2));
        let newer = write(&older, "a.b", json!(3));
        let update = Update::new(Some("a.b"), false);

        // The newer write is delivered first; the older one arrives late.
        assert_eq!(obs.dispatch(&update, &newer, 2), Gate::Fire);
        assert_eq!(obs.dispatch(&update, &older, 1), Gate::Stale);
        assert_eq!(*seen.lock().unwrap(), vec![Some(3.0)]);

        // The cache still holds the newer value.
        assert_eq!(obs.gate(&update, &newer), Gate::Unchanged);
    }

    #[test]
    fn starting_generation_rejects_earlier_snapshots() {
        let snap = snapshot();
        let obs = observer(Some("a.b"), ReadSettings::default(), &snap).at_generation(5);
        let next = write(&snap, "a.b", json!(9));
        let update = Update::new(Some("a.b"), false);
        assert_eq!(obs.dispatch(&update, &next, 4), Gate::Stale);
        assert_eq!(obs.dispatch(&update, &next, 5), Gate::Fire);
    }

    #[test]
    fn deactivated_observer_is_skipped() {
        let snap = snapshot();
        let obs = observer(None, ReadSettings::default(), &snap);
        obs.deactivate();
        assert!(!obs.is_active());
        assert_eq!(obs.gate(&Update::refresh_all(), &snap), Gate::Disposed);
    }

    #[test]
    fn update_normalizes_empty_selector() {
        assert_eq!(Update::new(Some(""), false).selector, None);
        assert_eq!(Update::refresh_all(), Update::new(None, true));
    }
}
