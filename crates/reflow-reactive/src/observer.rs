#![forbid(unsafe_code)]

//! Observation: converting mappings and lists into change-notifying state.
//!
//! [`observe`] walks a container, gives every mapping entry a backing
//! dependency, installs one collection-level dependency for "this container's
//! shape changed", and recurses into nested containers. Observation is
//! idempotent: a container already carrying a marker is returned as-is, which
//! also makes cyclic structures safe (the marker is installed before children
//! are walked).
//!
//! Reads and writes go through the tracked accessors defined here. Two writes
//! are *deliberately* invisible, matching the engine's documented contract:
//!
//! - assigning a brand-new key with the plain accessor (`MapRef::set` on an
//!   absent key defines a plain slot) — use [`set`] to make it observable;
//! - raw index/length writes on lists — use the mutating list operations or
//!   [`set_item`].

use crate::dep::Dep;
use crate::value::{ListRef, MapRef, Slot, Value};

/// Marker attached to an observed container. Owns the collection-level
/// dependency used for shape changes (list mutation, reactive key add or
/// delete).
#[derive(Clone)]
pub struct Observer {
    dep: Dep,
}

impl Observer {
    pub(crate) fn new() -> Self {
        Observer { dep: Dep::new() }
    }

    /// The collection-level dependency.
    #[must_use]
    pub fn dep(&self) -> &Dep {
        &self.dep
    }
}

/// Make a value reactive. Containers get observed recursively; primitives
/// and containers flagged with [`mark_raw`] are left alone. Returns the
/// (possibly pre-existing) marker for containers.
pub fn observe(value: &Value) -> Option<Observer> {
    match value {
        Value::Map(map) => observe_map(map),
        Value::List(list) => observe_list(list),
        _ => None,
    }
}

fn observe_map(map: &MapRef) -> Option<Observer> {
    let (ob, children) = {
        let mut data = map.data_mut();
        if let Some(existing) = &data.ob {
            return Some(existing.clone());
        }
        if data.skip {
            return None;
        }
        let ob = Observer::new();
        data.ob = Some(ob.clone());
        // Walk: give each entry its backing dependency.
        let mut children = Vec::new();
        for slot in data.entries.values_mut() {
            slot.dep = Some(Dep::new());
            if slot.value.is_container() {
                children.push(slot.value.clone());
            }
        }
        (ob, children)
    };
    for child in &children {
        observe(child);
    }
    Some(ob)
}

fn observe_list(list: &ListRef) -> Option<Observer> {
    let (ob, children) = {
        let mut data = list.data_mut();
        if let Some(existing) = &data.ob {
            return Some(existing.clone());
        }
        if data.skip {
            return None;
        }
        let ob = Observer::new();
        data.ob = Some(ob.clone());
        let children: Vec<Value> = data.items.iter().filter(|v| v.is_container()).cloned().collect();
        (ob, children)
    };
    for child in &children {
        observe(child);
    }
    Some(ob)
}

/// Flag a container as non-reactive: [`observe`] will refuse it from now on.
/// Has no effect on primitives and cannot un-observe an already observed
/// container.
pub fn mark_raw(value: &Value) {
    match value {
        Value::Map(map) => map.data_mut().skip = true,
        Value::List(list) => list.data_mut().skip = true,
        _ => {}
    }
}

// ─── Tracked mapping accessors ───────────────────────────────────────────────

impl MapRef {
    /// Tracked read. When a subscriber is active, it subscribes to the key's
    /// dependency and — if the value is itself an observed container — to
    /// that container's collection dependency, so replacing the whole nested
    /// container is seen by anything that read through it.
    ///
    /// Reading an absent key registers nothing.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let (value, dep, child_dep) = {
            let data = self.data();
            let slot = data.entries.get(key)?;
            (slot.value.clone(), slot.dep.clone(), slot.value.observer_dep())
        };
        if let Some(dep) = dep {
            dep.depend();
            if let Some(child_dep) = child_dep {
                child_dep.depend();
                if let Value::List(list) = &value {
                    depend_list_children(list);
                }
            }
        }
        Some(value)
    }

    /// Tracked write through the key's accessor.
    ///
    /// - Writing a value that is `same` as the current one is a no-op.
    /// - Writing an existing observed key replaces the value, observes the
    ///   new value, and notifies the key's dependency.
    /// - Writing a brand-new key defines a plain slot: **not observable**.
    ///   Use the free function [`set`] when the addition must notify.
    pub fn set(&self, key: &str, value: Value) {
        let notify = {
            let mut data = self.data_mut();
            match data.entries.get_mut(key) {
                Some(slot) => {
                    if slot.value.same(&value) {
                        return;
                    }
                    slot.value = value.clone();
                    slot.dep.clone()
                }
                None => {
                    data.entries.insert(key.to_string(), Slot::plain(value.clone()));
                    None
                }
            }
        };
        if let Some(dep) = notify {
            observe(&value);
            dep.notify();
        }
    }

    /// Tracked key-set snapshot: enumeration depends on the collection-level
    /// dependency, so reactive adds/deletes re-run enumerators.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.depend();
        self.keys_raw()
    }

    /// Tracked membership test; depends on the collection-level dependency.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.depend();
        self.has_raw(key)
    }

    /// Tracked length; depends on the collection-level dependency.
    #[must_use]
    pub fn len(&self) -> usize {
        self.depend();
        self.len_raw()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked entry snapshot: equivalent to `keys()` plus a tracked `get`
    /// of every key.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }

    /// Register the mapping's collection-level dependency with the active
    /// subscriber, if the mapping is observed.
    pub fn depend(&self) {
        if let Some(ob) = self.observer() {
            ob.dep().depend();
        }
    }
}

impl ListRef {
    /// Register the list's collection-level dependency with the active
    /// subscriber, if the list is observed.
    pub fn depend(&self) {
        if let Some(ob) = self.observer() {
            ob.dep().depend();
        }
    }
}

/// Recursively depend on the collection dependencies of every container
/// element, since list elements are not read through accessors.
pub(crate) fn depend_list_children(list: &ListRef) {
    for item in list.items_snapshot() {
        if let Some(dep) = item.observer_dep() {
            dep.depend();
        }
        if let Value::List(inner) = &item {
            depend_list_children(inner);
        }
    }
}

// ─── Reactive structural operations ──────────────────────────────────────────

/// Set a key on a mapping and make the change observable even when the key is
/// brand new: an existing key routes through the normal accessor; a new key
/// on an observed mapping gets a reactive slot and the collection-level
/// dependency is notified, re-running anything that enumerated the mapping.
pub fn set(map: &MapRef, key: &str, value: Value) {
    if map.has_raw(key) {
        map.set(key, value);
        return;
    }
    let collection_dep = {
        let mut data = map.data_mut();
        match &data.ob {
            None => {
                data.entries.insert(key.to_string(), Slot::plain(value.clone()));
                None
            }
            Some(ob) => {
                let collection_dep = ob.dep().clone();
                data.entries.insert(
                    key.to_string(),
                    Slot { value: value.clone(), dep: Some(Dep::new()) },
                );
                Some(collection_dep)
            }
        }
    };
    if let Some(dep) = collection_dep {
        observe(&value);
        dep.notify();
    }
}

/// Delete a key from a mapping; if it existed on an observed mapping, notify
/// the collection-level dependency.
pub fn del(map: &MapRef, key: &str) {
    let dep = {
        let mut data = map.data_mut();
        if data.entries.remove(key).is_none() {
            return;
        }
        data.ob.as_ref().map(|ob| ob.dep().clone())
    };
    if let Some(dep) = dep {
        dep.notify();
    }
}

/// Replace (or append) a list element observably, by routing through
/// `splice`/`push` rather than raw index assignment.
pub fn set_item(list: &ListRef, index: usize, value: Value) {
    if index >= list.len_raw() {
        list.push(value);
    } else {
        list.splice(index, 1, vec![value]);
    }
}
