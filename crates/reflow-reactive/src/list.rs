#![forbid(unsafe_code)]

//! The observable list operations.
//!
//! List element slots are not individually tracked. Instead the handle
//! implements the seven mutating operations, each of which performs the plain
//! operation first, then observes any newly inserted elements, then notifies
//! the list's collection-level dependency exactly once. Everything else —
//! index reads, snapshots, raw writes — delegates to plain storage.
//!
//! On an unobserved list the seven operations degrade to their plain
//! counterparts: no observation, no notification.

use std::cmp::Ordering;

use crate::observer::observe;
use crate::value::{ListRef, Value};

impl ListRef {
    /// Append one element.
    pub fn push(&self, value: Value) {
        self.data_mut().items.push(value.clone());
        self.after_mutation(&[value]);
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        let removed = self.data_mut().items.pop();
        if removed.is_some() {
            self.after_mutation(&[]);
        }
        removed
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        let removed = {
            let mut data = self.data_mut();
            if data.items.is_empty() { None } else { Some(data.items.remove(0)) }
        };
        if removed.is_some() {
            self.after_mutation(&[]);
        }
        removed
    }

    /// Prepend one element.
    pub fn unshift(&self, value: Value) {
        self.data_mut().items.insert(0, value.clone());
        self.after_mutation(&[value]);
    }

    /// Remove `delete_count` elements starting at `start` (both clamped to
    /// the current length) and insert `items` in their place. Returns the
    /// removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let inserted = items.clone();
        let removed: Vec<Value> = {
            let mut data = self.data_mut();
            let len = data.items.len();
            let start = start.min(len);
            let end = start.saturating_add(delete_count).min(len);
            data.items.splice(start..end, items).collect()
        };
        self.after_mutation(&inserted);
        removed
    }

    /// Sort in place using the canonical value ordering (variant rank, then
    /// numeric/lexical order within a rank).
    pub fn sort(&self) {
        self.sort_by(Value::total_cmp);
    }

    /// Sort in place with a caller-supplied comparator.
    ///
    /// The elements are moved out of the shared storage for the duration of
    /// the comparator calls, so a comparator may safely read (but will not
    /// see) the list it is sorting.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut items = std::mem::take(&mut self.data_mut().items);
        items.sort_by(&mut compare);
        self.data_mut().items = items;
        self.after_mutation(&[]);
    }

    /// Reverse the element order in place.
    pub fn reverse(&self) {
        self.data_mut().items.reverse();
        self.after_mutation(&[]);
    }

    /// Post-mutation contract shared by the seven operations: observe what
    /// was inserted, then notify once.
    fn after_mutation(&self, inserted: &[Value]) {
        let dep = self.data().ob.as_ref().map(|ob| ob.dep().clone());
        if let Some(dep) = dep {
            for item in inserted {
                observe(item);
            }
            dep.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observe;
    use crate::value::MapRef;
    use crate::watcher::{Watcher, WatcherOptions};

    fn observed_list(values: Vec<Value>) -> (ListRef, Watcher) {
        let list: ListRef = values.into_iter().collect();
        let map: MapRef = [("items", Value::List(list.clone()))].into_iter().collect();
        observe(&Value::Map(map.clone()));

        let source = map.clone();
        let reader = Watcher::new(
            Box::new(move || source.get("items").unwrap_or(Value::Null)),
            WatcherOptions { lazy: true, ..Default::default() },
        );
        reader.evaluate();
        (list, reader)
    }

    #[test]
    fn each_mutator_notifies() {
        let cases: Vec<(&str, Box<dyn Fn(&ListRef)>)> = vec![
            ("push", Box::new(|l| l.push(Value::num(9.0)))),
            ("pop", Box::new(|l| {
                l.pop();
            })),
            ("shift", Box::new(|l| {
                l.shift();
            })),
            ("unshift", Box::new(|l| l.unshift(Value::num(0.0)))),
            ("splice", Box::new(|l| {
                l.splice(1, 1, vec![Value::num(7.0)]);
            })),
            ("sort", Box::new(|l| l.sort())),
            ("reverse", Box::new(|l| l.reverse())),
        ];
        for (name, mutate) in cases {
            let (list, reader) = observed_list(vec![Value::num(3.0), Value::num(1.0), Value::num(2.0)]);
            assert!(!reader.is_dirty(), "{name}: clean before mutation");
            mutate(&list);
            assert!(reader.is_dirty(), "{name}: must notify");
        }
    }

    #[test]
    fn mutation_notifies_exactly_once_regardless_of_size() {
        let (list, reader) = observed_list(vec![Value::num(1.0)]);
        reader.evaluate();
        // One splice inserting three elements: one notification is enough for
        // a lazy reader, and re-evaluating clears it completely.
        list.splice(0, 1, vec![Value::num(1.0), Value::num(2.0), Value::num(3.0)]);
        assert!(reader.is_dirty());
        reader.evaluate();
        assert!(!reader.is_dirty());
    }

    #[test]
    fn inserted_elements_become_observed() {
        let (list, _reader) = observed_list(vec![]);
        let pushed = MapRef::new();
        let spliced = MapRef::new();
        let unshifted = MapRef::new();

        list.push(Value::Map(pushed.clone()));
        list.splice(1, 0, vec![Value::Map(spliced.clone())]);
        list.unshift(Value::Map(unshifted.clone()));

        assert!(pushed.is_observed());
        assert!(spliced.is_observed());
        assert!(unshifted.is_observed());
    }

    #[test]
    fn pop_on_empty_list_is_silent() {
        let (list, reader) = observed_list(vec![]);
        assert!(list.pop().is_none());
        assert!(list.shift().is_none());
        assert!(!reader.is_dirty());
    }

    #[test]
    fn mutators_on_unobserved_list_do_not_observe_inserts() {
        let list = ListRef::new();
        let child = MapRef::new();
        list.push(Value::Map(child.clone()));
        assert!(!child.is_observed());
        assert_eq!(list.len_raw(), 1);
    }

    #[test]
    fn splice_clamps_out_of_range() {
        let (list, _reader) = observed_list(vec![Value::num(1.0), Value::num(2.0)]);
        let removed = list.splice(10, 5, vec![Value::num(3.0)]);
        assert!(removed.is_empty());
        assert_eq!(list.len_raw(), 3);
        assert_eq!(list.get(2).unwrap().as_num(), Some(3.0));
    }

    #[test]
    fn sort_orders_canonically() {
        let (list, _reader) = observed_list(vec![Value::num(3.0), Value::num(1.0), Value::num(2.0)]);
        list.sort();
        let nums: Vec<f64> = list.items_snapshot().iter().filter_map(Value::as_num).collect();
        assert_eq!(nums, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn sort_by_custom_comparator() {
        let (list, reader) = observed_list(vec![Value::num(1.0), Value::num(3.0), Value::num(2.0)]);
        list.sort_by(|a, b| b.total_cmp(a));
        let nums: Vec<f64> = list.items_snapshot().iter().filter_map(Value::as_num).collect();
        assert_eq!(nums, [3.0, 2.0, 1.0]);
        assert!(reader.is_dirty());
    }
}
