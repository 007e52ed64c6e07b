//! Dot-path navigation over [`Value`] trees.
//!
//! Selectors are `.`-separated segments from the root (`"a.b.c"`). Map
//! entries are addressed by key, list items by decimal index. An absent or
//! empty selector denotes the root itself.
//!
//! Paths are never created: a selector whose intermediate segment does not
//! exist resolves to nothing on read and is a no-op on write.

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::value::Value;

/// The value half of a write: either a value, or an updater applied to the
/// previous value at the target selector.
pub enum Input<'a> {
    Value(Value),
    Updater(Box<dyn FnOnce(Option<Value>) -> Value + 'a>),
}

impl<'a> Input<'a> {
    pub fn updater(f: impl FnOnce(Option<Value>) -> Value + 'a) -> Self {
        Input::Updater(Box::new(f))
    }

    /// Resolve to the value that will be stored.
    pub fn apply(self, previous: Option<Value>) -> Value {
        match self {
            Input::Value(value) => value,
            Input::Updater(f) => f(previous),
        }
    }
}

impl From<Value> for Input<'_> {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}

/// Treat an empty selector like an absent one.
pub fn normalize(selector: Option<&str>) -> Option<&str> {
    selector.filter(|s| !s.is_empty())
}

/// Read the value at `selector`.
///
/// A root without keys (`Null`, empty map, empty list) yields the null
/// sentinel `Some(Value::Null)` whatever the selector. A missing segment
/// is reported at debug level and yields `None`.
pub fn get(root: &Value, selector: Option<&str>) -> Option<Value> {
    match resolve(root, selector) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("path: {}", err);
            None
        }
    }
}

/// Like [`get`], but returns the miss instead of reporting it.
pub fn resolve(root: &Value, selector: Option<&str>) -> Result<Value, StoreError> {
    if root.has_no_keys() {
        return Ok(Value::Null);
    }
    match normalize(selector) {
        Some(selector) => walk(root, selector, selector),
        None => Ok(root.clone()),
    }
}

/// Write `input` at `selector`, in place, and return the root.
///
/// With no selector the resolved input becomes the new root (an updater
/// receives the old root). Otherwise the final segment is assigned on its
/// parent container. If any intermediate segment is missing the write is
/// reported at warn level and `root` is returned unchanged.
pub fn set(root: &Value, selector: Option<&str>, input: Input<'_>) -> Value {
    match try_set(root, selector, input) {
        Ok(value) => value,
        Err(err) => {
            warn!("path: write skipped: {}", err);
            root.clone()
        }
    }
}

/// Like [`set`], but returns the miss instead of reporting it.
pub fn try_set(root: &Value, selector: Option<&str>, input: Input<'_>) -> Result<Value, StoreError> {
    let Some(selector) = normalize(selector) else {
        return Ok(input.apply(Some(root.clone())));
    };

    let (parent_path, last) = split_last(selector);
    let parent = match parent_path {
        Some(parent_path) => walk(root, selector, parent_path)?,
        None => root.clone(),
    };
    assign(&parent, selector, last, input)?;
    Ok(root.clone())
}

/// Path-copy `root` down to the parent of the selector's final segment.
///
/// The returned root is a new container, as is every container on the way
/// to the write target's parent; everything else is shared with `root`.
/// Writing in place into the returned tree therefore leaves `root`
/// untouched, and untouched subtrees keep their identity.
pub fn fork(root: &Value, selector: Option<&str>) -> Result<Value, StoreError> {
    let new_root = copy_container(root);
    let Some(selector) = normalize(selector) else {
        return Ok(new_root);
    };

    if let (Some(parent_path), _) = split_last(selector) {
        let mut current = new_root.clone();
        for segment in parent_path.split('.') {
            let next = child(&current, segment).ok_or_else(|| miss(selector, segment))?;
            let copied = copy_container(&next);
            replace_child(&current, segment, copied.clone());
            current = copied;
        }
    }
    Ok(new_root)
}

fn walk(root: &Value, selector: &str, path: &str) -> Result<Value, StoreError> {
    let mut current = root.clone();
    for segment in path.split('.') {
        current = child(&current, segment).ok_or_else(|| miss(selector, segment))?;
    }
    Ok(current)
}

fn assign(parent: &Value, selector: &str, key: &str, input: Input<'_>) -> Result<(), StoreError> {
    match parent {
        Value::Map(map) => {
            let previous = map.get(key);
            map.insert(key, input.apply(previous));
            Ok(())
        }
        Value::List(list) => {
            let index = parse_index(key)
                .filter(|&i| i <= list.len())
                .ok_or_else(|| miss(selector, key))?;
            let previous = list.get(index);
            list.set(index, input.apply(previous));
            Ok(())
        }
        _ => Err(miss(selector, key)),
    }
}

fn child(value: &Value, segment: &str) -> Option<Value> {
    match value {
        Value::Map(map) => map.get(segment),
        Value::List(list) => parse_index(segment).and_then(|i| list.get(i)),
        _ => None,
    }
}

fn replace_child(parent: &Value, segment: &str, value: Value) {
    match parent {
        Value::Map(map) => {
            map.insert(segment, value);
        }
        Value::List(list) => {
            if let Some(i) = parse_index(segment) {
                list.set(i, value);
            }
        }
        _ => {}
    }
}

/// A new container with the same children; scalars are cloned.
pub(crate) fn copy_container(value: &Value) -> Value {
    match value {
        Value::Map(map) => Value::Map(map.shallow_copy()),
        Value::List(list) => Value::List(list.shallow_copy()),
        scalar => scalar.clone(),
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// `"a.b.c"` -> `(Some("a.b"), "c")`, `"a"` -> `(None, "a")`.
fn split_last(selector: &str) -> (Option<&str>, &str) {
    match selector.rfind('.') {
        Some(idx) => (Some(&selector[..idx]), &selector[idx + 1..]),
        None => (None, selector),
    }
}

fn miss(selector: &str, segment: &str) -> StoreError {
    StoreError::PathNotFound {
        selector: selector.to_string(),
        segment: segment.to_string(),
    }
}
