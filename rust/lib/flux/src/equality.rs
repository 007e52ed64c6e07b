//! Reference equality, structural equality and deep cloning of [`Value`]s.
//!
//! Structural equality and cloning walk container graphs with a visited
//! map keyed by container identity, so shared subtrees are visited once
//! and cyclic graphs terminate.

use std::collections::HashMap;

use serde::Deserialize;

use crate::value::{List, Map, Value};

/// Change-detection strategy used when gating notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Structural comparison with [`deep_equal`].
    #[default]
    Deep,
    /// Identity comparison with [`ref_equal`]. Cheaper, but a value that is
    /// equal yet freshly cloned counts as changed.
    Reference,
    /// No change detection: every relevant write counts as a change.
    Never,
}

impl Comparison {
    /// Whether `previous` and `current` are the same under this strategy.
    pub fn unchanged(self, previous: Option<&Value>, current: Option<&Value>) -> bool {
        match (previous, current) {
            (None, None) => self != Comparison::Never,
            (Some(a), Some(b)) => match self {
                Comparison::Deep => deep_equal(a, b),
                Comparison::Reference => ref_equal(a, b),
                Comparison::Never => false,
            },
            _ => false,
        }
    }

    /// The form in which an observer should remember `value` so that a
    /// later [`unchanged`](Self::unchanged) check is meaningful.
    ///
    /// `Deep` keeps a private copy, so in-place mutation of the live value
    /// is still seen as a change. `Reference` keeps the handle.
    pub fn remember(self, value: &Value) -> Value {
        match self {
            Comparison::Deep => deep_clone(value),
            Comparison::Reference | Comparison::Never => value.clone(),
        }
    }
}

/// Identity comparison.
///
/// Containers are equal only if they are the same container. Scalars and
/// dates compare by value. `NaN` is not equal to itself.
pub fn ref_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Map(x), Value::Map(y)) => x.ptr_eq(y),
        (Value::List(x), Value::List(y)) => x.ptr_eq(y),
        _ => scalar_equal(a, b).unwrap_or(false),
    }
}

/// Structural comparison across maps, lists, scalars and dates.
///
/// Dates compare by instant. Map key order is irrelevant. Cycle safe: a
/// container already paired with a different counterpart is unequal.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    let mut seen = Seen::default();
    deep_equal_inner(a, b, &mut seen)
}

#[derive(Default)]
struct Seen {
    left: HashMap<usize, usize>,
    right: HashMap<usize, usize>,
}

impl Seen {
    /// `Some(result)` if either side was already paired, `None` if this is
    /// a new pair (which is recorded).
    fn pair(&mut self, a: usize, b: usize) -> Option<bool> {
        match (self.left.get(&a), self.right.get(&b)) {
            (None, None) => {
                self.left.insert(a, b);
                self.right.insert(b, a);
                None
            }
            (Some(&b2), Some(&a2)) => Some(b2 == b && a2 == a),
            _ => Some(false),
        }
    }
}

fn deep_equal_inner(a: &Value, b: &Value, seen: &mut Seen) -> bool {
    match (a, b) {
        (Value::Map(x), Value::Map(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            if let Some(result) = seen.pair(x.id(), y.id()) {
                return result;
            }
            maps_equal(x, y, seen)
        }
        (Value::List(x), Value::List(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            if let Some(result) = seen.pair(x.id(), y.id()) {
                return result;
            }
            lists_equal(x, y, seen)
        }
        _ => scalar_equal(a, b).unwrap_or(false),
    }
}

fn maps_equal(x: &Map, y: &Map, seen: &mut Seen) -> bool {
    let left = x.entries();
    let right = y.entries();
    if left.len() != right.len() {
        return false;
    }
    // Both sides are key-ordered.
    left.iter()
        .zip(right.iter())
        .all(|((ka, va), (kb, vb))| ka == kb && deep_equal_inner(va, vb, seen))
}

fn lists_equal(x: &List, y: &List, seen: &mut Seen) -> bool {
    let left = x.items();
    let right = y.items();
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|(va, vb)| deep_equal_inner(va, vb, seen))
}

/// `None` when either side is a container.
fn scalar_equal(a: &Value, b: &Value) -> Option<bool> {
    Some(match (a, b) {
        (Value::List(_), _) | (_, Value::List(_)) | (Value::Map(_), _) | (_, Value::Map(_)) => {
            return None;
        }
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        _ => false,
    })
}

/// Structural deep copy.
///
/// Every container reachable from `value` is copied exactly once: a
/// container referenced twice (including cyclically) is shared in the
/// clone graph the same way. Scalars and dates are copied by value.
pub fn deep_clone(value: &Value) -> Value {
    let mut clones = HashMap::new();
    deep_clone_inner(value, &mut clones)
}

fn deep_clone_inner(value: &Value, clones: &mut HashMap<usize, Value>) -> Value {
    match value {
        Value::Map(map) => {
            if let Some(done) = clones.get(&map.id()) {
                return done.clone();
            }
            let copy = Map::new();
            clones.insert(map.id(), Value::Map(copy.clone()));
            for (key, item) in map.entries() {
                copy.insert(key, deep_clone_inner(&item, clones));
            }
            Value::Map(copy)
        }
        Value::List(list) => {
            if let Some(done) = clones.get(&list.id()) {
                return done.clone();
            }
            let copy = List::new();
            clones.insert(list.id(), Value::List(copy.clone()));
            for item in list.items() {
                copy.push(deep_clone_inner(&item, clones));
            }
            Value::List(copy)
        }
        scalar => scalar.clone(),
    }
}
