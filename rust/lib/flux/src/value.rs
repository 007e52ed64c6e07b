use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::equality;
use crate::error::StoreError;

/// A node of the store snapshot.
///
/// Scalars (`Null`, `Bool`, `Number`, `String`, `Date`) are plain values.
/// `Map` and `List` are shared handles: cloning a `Value` clones the
/// handle (an `Arc` increment), not the data. Two handles to the same
/// container are reference-equal, and a write through one is visible
/// through the other.
///
/// `==` compares structurally (see [`equality::deep_equal`]).
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    List(List),
    Map(Map),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Short type name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// True for values that expose no keys: `Null`, an empty map or an
    /// empty list.
    pub fn has_no_keys(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Map(m) => m.is_empty(),
            Value::List(l) => l.is_empty(),
            _ => false,
        }
    }

    /// Convert to a `serde_json::Value`.
    ///
    /// Dates become RFC 3339 strings; integral numbers become JSON
    /// integers. Shared (non-cyclic) containers are emitted once per
    /// reference. Returns `StoreError::Cycle` for cyclic graphs.
    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        let mut stack = Vec::new();
        to_json_inner(self, &mut stack)
    }
}

fn to_json_inner(value: &Value, stack: &mut Vec<usize>) -> Result<serde_json::Value, StoreError> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => {
            serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        Value::List(list) => {
            if stack.contains(&list.id()) {
                return Err(StoreError::Cycle);
            }
            stack.push(list.id());
            let items = list
                .items()
                .iter()
                .map(|item| to_json_inner(item, stack))
                .collect::<Result<Vec<_>, _>>()?;
            stack.pop();
            serde_json::Value::Array(items)
        }
        Value::Map(map) => {
            if stack.contains(&map.id()) {
                return Err(StoreError::Cycle);
            }
            stack.push(map.id());
            let mut out = serde_json::Map::new();
            for (key, item) in map.entries() {
                out.insert(key, to_json_inner(&item, stack)?);
            }
            stack.pop();
            serde_json::Value::Object(out)
        }
    })
}

fn number_to_json(n: f64) -> serde_json::Value {
    // 2^53: beyond this f64 no longer represents every integer.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equality::deep_equal(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = Vec::new();
        write_debug(self, &mut stack, f)
    }
}

fn write_debug(value: &Value, stack: &mut Vec<usize>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "{s:?}"),
        Value::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
        Value::List(list) => {
            if stack.contains(&list.id()) {
                return f.write_str("<cycle>");
            }
            stack.push(list.id());
            f.write_str("[")?;
            for (i, item) in list.items().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_debug(item, stack, f)?;
            }
            stack.pop();
            f.write_str("]")
        }
        Value::Map(map) => {
            if stack.contains(&map.id()) {
                return f.write_str("<cycle>");
            }
            stack.push(map.id());
            f.write_str("{")?;
            for (i, (key, item)) in map.entries().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key:?}: ")?;
                write_debug(item, stack, f)?;
            }
            stack.pop();
            f.write_str("}")
        }
    }
}

// ============================================================================
// Containers
// ============================================================================

/// Shared, interior-mutable string-keyed mapping.
///
/// Accessors copy entries out (handle clones) and release the lock before
/// returning, so no lock is ever held across a recursive walk.
#[derive(Clone, Default)]
pub struct Map {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.write().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Key/value pairs ordered by key.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// A new container holding the same entries (children are shared).
    pub fn shallow_copy(&self) -> Map {
        Map::from_entries(self.entries())
    }

    /// True if both handles point to the same container.
    pub fn ptr_eq(&self, other: &Map) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Map(self.clone()), f)
    }
}

/// Shared, interior-mutable sequence.
#[derive(Clone, Default)]
pub struct List {
    inner: Arc<RwLock<Vec<Value>>>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(items.into_iter().collect())),
        }
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.read().get(index).cloned()
    }

    /// Replace the item at `index`, or append when `index == len()`.
    ///
    /// Returns `false` (and changes nothing) for any other index.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        let mut items = self.write();
        match index.cmp(&items.len()) {
            std::cmp::Ordering::Less => {
                items[index] = value.into();
                true
            }
            std::cmp::Ordering::Equal => {
                items.push(value.into());
                true
            }
            std::cmp::Ordering::Greater => false,
        }
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.write().push(value.into());
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn items(&self) -> Vec<Value> {
        self.read().clone()
    }

    pub fn shallow_copy(&self) -> List {
        List::from_items(self.items())
    }

    pub fn ptr_eq(&self, other: &List) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Value>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::List(self.clone()), f)
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

from_integer!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(List::from_items(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(List::from_items(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => Value::Map(Map::from_entries(
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}
