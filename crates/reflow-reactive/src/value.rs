#![forbid(unsafe_code)]

//! Dynamic values tracked by the reactive engine.
//!
//! State flowing through the engine is untyped at the Rust level: a [`Value`]
//! is a primitive, a string, a mapping, or a list. Containers are cheap-clone
//! shared handles (`Rc<RefCell<..>>` inside), so cloning a [`Value`] never
//! copies container contents — it aliases them, which is exactly what the
//! dependency-tracking layer needs to hang one observer marker off each
//! container regardless of how many paths reach it.
//!
//! # Equality
//!
//! Two notions of equality exist and they are deliberately different:
//!
//! - [`Value::same`] is the *setter* comparison: primitives by value (with two
//!   NaNs counting as equal so a NaN write does not notify forever),
//!   containers by identity.
//! - [`loose_eq`] is deep structural equality, used by watchers that opt into
//!   skipping callbacks for equivalent values. NaN is unequal to itself here.

use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::dep::Dep;
use crate::observer::Observer;

/// A dynamic value. Containers alias shared storage; see the module docs.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Map(MapRef),
    List(ListRef),
}

impl Value {
    /// Shorthand for a string value.
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Shorthand for a numeric value.
    #[must_use]
    pub fn num(n: f64) -> Self {
        Value::Num(n)
    }

    /// A fresh empty mapping.
    #[must_use]
    pub fn map() -> Self {
        Value::Map(MapRef::new())
    }

    /// A fresh empty list.
    #[must_use]
    pub fn list() -> Self {
        Value::List(ListRef::new())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is a mapping or list.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Map(_) | Value::List(_))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// The setter comparison: strict equality, except two NaNs compare equal.
    ///
    /// Containers compare by identity — replacing a mapping with a different
    /// mapping of equal contents still counts as a change.
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a.same_ref(b),
            (Value::List(a), Value::List(b)) => a.same_ref(b),
            _ => false,
        }
    }

    /// The collection-level dependency of this value's observer marker, if
    /// the value is an observed container.
    #[must_use]
    pub(crate) fn observer_dep(&self) -> Option<Dep> {
        match self {
            Value::Map(m) => m.observer().map(|ob| ob.dep().clone()),
            Value::List(l) => l.observer().map(|ob| ob.dep().clone()),
            _ => None,
        }
    }

    /// Total ordering used by the default list `sort`: variants rank
    /// `Null < Bool < Num < Str < List < Map`; containers of equal rank are
    /// left in place.
    #[must_use]
    pub(crate) fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Num(_) => 2,
                Value::Str(_) => 3,
                Value::List(_) => 4,
                Value::Map(_) => 5,
            }
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Num(a), Value::Num(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Num(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Num(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::str(v)
    }
}

// Debug output is shallow on purpose: containers may be cyclic.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Num(n) => write!(f, "Num({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Map(m) => write!(f, "Map(len={})", m.data().entries.len()),
            Value::List(l) => write!(f, "List(len={})", l.data().items.len()),
        }
    }
}

/// Deep structural equality. NaN is unequal to itself, matching the strict
/// comparison watchers would otherwise perform element by element.
#[must_use]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if x.same_ref(y) {
                return true;
            }
            let xs = x.items_snapshot();
            let ys = y.items_snapshot();
            xs.len() == ys.len() && xs.iter().zip(&ys).all(|(u, v)| loose_eq(u, v))
        }
        (Value::Map(x), Value::Map(y)) => {
            if x.same_ref(y) {
                return true;
            }
            let xk = x.keys_raw();
            if xk.len() != y.data().entries.len() {
                return false;
            }
            xk.iter().all(|k| match (x.get_raw(k), y.get_raw(k)) {
                (Some(u), Some(v)) => loose_eq(&u, &v),
                _ => false,
            })
        }
        _ => false,
    }
}

// ─── Mapping storage ─────────────────────────────────────────────────────────

/// One observed (or not-yet-observed) mapping entry: the stored value plus the
/// backing dependency installed at observation time. The slot table is the
/// registration table mapping field identity to its dependency.
pub(crate) struct Slot {
    pub(crate) value: Value,
    pub(crate) dep: Option<Dep>,
}

impl Slot {
    /// A plain, untracked slot.
    pub(crate) fn plain(value: Value) -> Self {
        Slot { value, dep: None }
    }
}

pub(crate) struct MapData {
    pub(crate) entries: AHashMap<String, Slot>,
    pub(crate) ob: Option<Observer>,
    pub(crate) skip: bool,
}

/// Shared handle to a mapping.
///
/// Reactive accessors (`get`, `set`, `keys`, ...) live in the observer
/// module; everything here is raw storage that never touches dependencies.
#[derive(Clone)]
pub struct MapRef {
    inner: Rc<RefCell<MapData>>,
}

impl MapRef {
    #[must_use]
    pub fn new() -> Self {
        MapRef {
            inner: Rc::new(RefCell::new(MapData {
                entries: AHashMap::new(),
                ob: None,
                skip: false,
            })),
        }
    }

    /// Identity comparison: do both handles alias the same storage?
    #[must_use]
    pub fn same_ref(&self, other: &MapRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn data(&self) -> Ref<'_, MapData> {
        self.inner.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, MapData> {
        self.inner.borrow_mut()
    }

    /// Untracked read.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.data().entries.get(key).map(|slot| slot.value.clone())
    }

    /// Untracked write. Overwrites an existing slot's value in place or
    /// defines the key as a plain slot; never notifies and never installs a
    /// dependency.
    pub fn insert_raw(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut data = self.data_mut();
        match data.entries.get_mut(&key) {
            Some(slot) => slot.value = value,
            None => {
                data.entries.insert(key, Slot::plain(value));
            }
        }
    }

    /// Untracked key snapshot.
    #[must_use]
    pub fn keys_raw(&self) -> Vec<String> {
        self.data().entries.keys().cloned().collect()
    }

    /// Untracked length.
    #[must_use]
    pub fn len_raw(&self) -> usize {
        self.data().entries.len()
    }

    /// Untracked membership test.
    #[must_use]
    pub fn has_raw(&self, key: &str) -> bool {
        self.data().entries.contains_key(key)
    }

    /// Whether an observer marker is installed.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.data().ob.is_some()
    }

    pub(crate) fn observer(&self) -> Option<Observer> {
        self.data().ob.clone()
    }
}

impl Default for MapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for MapRef {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let map = MapRef::new();
        {
            let mut data = map.data_mut();
            for (k, v) in iter {
                data.entries.insert(k.into(), Slot::plain(v));
            }
        }
        map
    }
}

// ─── List storage ────────────────────────────────────────────────────────────

pub(crate) struct ListData {
    pub(crate) items: Vec<Value>,
    pub(crate) ob: Option<Observer>,
    pub(crate) skip: bool,
}

/// Shared handle to a list.
///
/// The seven mutating operations (`push`, `pop`, `shift`, `unshift`,
/// `splice`, `sort`/`sort_by`, `reverse`) live in the list module and are the
/// *only* writes the engine observes. Raw index writes and raw truncation are
/// documented untracked escape hatches.
#[derive(Clone)]
pub struct ListRef {
    inner: Rc<RefCell<ListData>>,
}

impl ListRef {
    #[must_use]
    pub fn new() -> Self {
        ListRef {
            inner: Rc::new(RefCell::new(ListData {
                items: Vec::new(),
                ob: None,
                skip: false,
            })),
        }
    }

    /// Identity comparison: do both handles alias the same storage?
    #[must_use]
    pub fn same_ref(&self, other: &ListRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn data(&self) -> Ref<'_, ListData> {
        self.inner.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, ListData> {
        self.inner.borrow_mut()
    }

    /// Untracked element read.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.data().items.get(index).cloned()
    }

    /// Untracked length.
    #[must_use]
    pub fn len_raw(&self) -> usize {
        self.data().items.len()
    }

    /// Untracked snapshot of the current elements.
    #[must_use]
    pub fn items_snapshot(&self) -> Vec<Value> {
        self.data().items.clone()
    }

    /// Direct index assignment. **Not observable**: no subscriber is
    /// notified and the new element is not observed. Use `set_item` (or
    /// `splice`) for a tracked replacement.
    pub fn set_raw(&self, index: usize, value: Value) {
        let mut data = self.data_mut();
        if index < data.items.len() {
            data.items[index] = value;
        }
    }

    /// Direct length truncation. **Not observable**, like `set_raw`.
    pub fn truncate_raw(&self, len: usize) {
        self.data_mut().items.truncate(len);
    }

    /// Whether an observer marker is installed.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.data().ob.is_some()
    }

    pub(crate) fn observer(&self) -> Option<Observer> {
        self.data().ob.clone()
    }
}

impl Default for ListRef {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for ListRef {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let list = ListRef::new();
        list.data_mut().items.extend(iter);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_compares_primitives_by_value() {
        assert!(Value::num(1.0).same(&Value::num(1.0)));
        assert!(!Value::num(1.0).same(&Value::num(2.0)));
        assert!(Value::str("a").same(&Value::str("a")));
        assert!(!Value::Bool(true).same(&Value::num(1.0)));
        assert!(Value::Null.same(&Value::Null));
    }

    #[test]
    fn same_treats_two_nans_as_equal() {
        assert!(Value::num(f64::NAN).same(&Value::num(f64::NAN)));
        assert!(!Value::num(f64::NAN).same(&Value::num(0.0)));
    }

    #[test]
    fn same_compares_containers_by_identity() {
        let a = MapRef::new();
        let b = MapRef::new();
        assert!(Value::Map(a.clone()).same(&Value::Map(a.clone())));
        assert!(!Value::Map(a).same(&Value::Map(b)));
    }

    #[test]
    fn loose_eq_is_structural() {
        let a: MapRef = [("x", Value::num(1.0))].into_iter().collect();
        let b: MapRef = [("x", Value::num(1.0))].into_iter().collect();
        assert!(loose_eq(&Value::Map(a.clone()), &Value::Map(b)));

        let c: MapRef = [("x", Value::num(2.0))].into_iter().collect();
        assert!(!loose_eq(&Value::Map(a), &Value::Map(c)));
    }

    #[test]
    fn loose_eq_nan_is_unequal() {
        assert!(!loose_eq(&Value::num(f64::NAN), &Value::num(f64::NAN)));
    }

    #[test]
    fn loose_eq_lists() {
        let a: ListRef = [Value::num(1.0), Value::str("x")].into_iter().collect();
        let b: ListRef = [Value::num(1.0), Value::str("x")].into_iter().collect();
        let c: ListRef = [Value::num(1.0)].into_iter().collect();
        assert!(loose_eq(&Value::List(a.clone()), &Value::List(b)));
        assert!(!loose_eq(&Value::List(a), &Value::List(c)));
    }

    #[test]
    fn raw_list_writes_stay_raw() {
        let list: ListRef = [Value::num(1.0), Value::num(2.0)].into_iter().collect();
        list.set_raw(0, Value::num(9.0));
        assert_eq!(list.get(0).unwrap().as_num(), Some(9.0));
        list.set_raw(10, Value::num(0.0)); // out of bounds: ignored
        assert_eq!(list.len_raw(), 2);
        list.truncate_raw(1);
        assert_eq!(list.len_raw(), 1);
    }
}
