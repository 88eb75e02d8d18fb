#![forbid(unsafe_code)]

//! Lazily-evaluated computed values backed by a lazy [`Watcher`].
//!
//! # Design
//!
//! A [`Computed`] wraps a lazy watcher. A change in any dependency only marks
//! it dirty; recomputation is deferred until the next [`get()`](Computed::get)
//! and happens at most once between two reads no matter how many dependencies
//! changed in between. A computed that is never read after going dirty is
//! never recomputed.
//!
//! # Invariants
//!
//! 1. `get()` never returns a stale value.
//! 2. The evaluation function runs only when the value is dirty and read.
//! 3. Reading a computed from inside another active subscriber forwards every
//!    dependency of the computed to that outer subscriber, so the outer
//!    computation transitively depends on everything the computed reads.

use crate::dep::TargetStack;
use crate::value::Value;
use crate::watcher::{GetterFn, Watcher, WatcherOptions};

/// A lazily-evaluated, memoized reactive value.
///
/// Cloning a `Computed` creates another handle to the same state.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    /// Create a computed value from an evaluation function. Nothing runs
    /// until the first read.
    #[must_use]
    pub fn new(getter: impl Fn() -> Value + 'static) -> Self {
        Self::from_getter(Box::new(getter))
    }

    /// Create a computed value from a boxed evaluation function.
    #[must_use]
    pub fn from_getter(getter: GetterFn) -> Self {
        Computed {
            watcher: Watcher::new(getter, WatcherOptions { lazy: true, ..Default::default() }),
        }
    }

    /// Current value, recomputing first if any dependency changed since the
    /// last read. Inside an active subscriber this also forwards the
    /// computed's dependencies outward.
    #[must_use]
    pub fn get(&self) -> Value {
        let value = if self.watcher.is_dirty() {
            self.watcher.evaluate()
        } else {
            self.watcher.value()
        };
        if TargetStack::is_tracking() {
            self.watcher.depend();
        }
        value
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The backing watcher (its id decides notification priority).
    #[must_use]
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Unsubscribe from every dependency; the cached value freezes.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.watcher.is_dirty())
            .field("value", &self.watcher.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::observer::observe;
    use crate::value::MapRef;
    use crate::watcher::{Watcher, WatcherOptions};

    fn observed(pairs: &[(&str, f64)]) -> MapRef {
        let map: MapRef = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::num(*v)))
            .collect();
        observe(&Value::Map(map.clone()));
        map
    }

    #[test]
    fn computes_on_first_read_only() {
        let map = observed(&[("x", 10.0)]);
        let evals = Rc::new(Cell::new(0u32));

        let source = map.clone();
        let evals_inner = Rc::clone(&evals);
        let doubled = Computed::new(move || {
            evals_inner.set(evals_inner.get() + 1);
            Value::num(source.get("x").and_then(|v| v.as_num()).unwrap_or(0.0) * 2.0)
        });

        assert_eq!(evals.get(), 0);
        assert_eq!(doubled.get().as_num(), Some(20.0));
        assert_eq!(evals.get(), 1);

        // Clean reads hit the cache.
        assert_eq!(doubled.get().as_num(), Some(20.0));
        assert_eq!(evals.get(), 1);
    }

    #[test]
    fn at_most_one_recompute_between_reads() {
        let map = observed(&[("x", 1.0)]);
        let evals = Rc::new(Cell::new(0u32));

        let source = map.clone();
        let evals_inner = Rc::clone(&evals);
        let tracked = Computed::new(move || {
            evals_inner.set(evals_inner.get() + 1);
            source.get("x").unwrap_or(Value::Null)
        });
        let _ = tracked.get();
        assert_eq!(evals.get(), 1);

        // Three dependency changes, zero reads: zero recomputes.
        map.set("x", Value::num(2.0));
        map.set("x", Value::num(3.0));
        map.set("x", Value::num(4.0));
        assert_eq!(evals.get(), 1);

        // One read: exactly one recompute.
        assert_eq!(tracked.get().as_num(), Some(4.0));
        assert_eq!(evals.get(), 2);
    }

    #[test]
    fn never_read_after_dirty_means_never_recomputed() {
        let map = observed(&[("x", 1.0)]);
        let evals = Rc::new(Cell::new(0u32));

        let source = map.clone();
        let evals_inner = Rc::clone(&evals);
        let tracked = Computed::new(move || {
            evals_inner.set(evals_inner.get() + 1);
            source.get("x").unwrap_or(Value::Null)
        });
        let _ = tracked.get();

        map.set("x", Value::num(2.0));
        assert!(tracked.is_dirty());
        assert_eq!(evals.get(), 1);
    }

    #[test]
    fn outer_subscriber_inherits_computed_dependencies() {
        let map = observed(&[("x", 1.0)]);
        let source = map.clone();
        let doubled = Computed::new(move || {
            Value::num(source.get("x").and_then(|v| v.as_num()).unwrap_or(0.0) * 2.0)
        });

        let doubled_clone = doubled.clone();
        let outer = Watcher::new(
            Box::new(move || doubled_clone.get()),
            WatcherOptions { lazy: true, ..Default::default() },
        );

        assert_eq!(outer.evaluate().as_num(), Some(2.0));

        // The outer watcher never read "x" itself, yet a write to "x" must
        // reach it through the computed's forwarded dependencies.
        map.set("x", Value::num(5.0));
        assert!(outer.is_dirty());
        assert_eq!(outer.evaluate().as_num(), Some(10.0));
    }

    #[test]
    fn computed_notifies_before_dependent_render() {
        // Priority: the computed's watcher was created first, so the notify
        // fan-out marks it dirty before any later-created always-active
        // subscriber runs — a flush can therefore never read a stale cache.
        let map = observed(&[("x", 1.0)]);
        let source = map.clone();
        let doubled = Computed::new(move || {
            Value::num(source.get("x").and_then(|v| v.as_num()).unwrap_or(0.0) * 2.0)
        });

        let seen = Rc::new(Cell::new(0.0f64));
        let seen_inner = Rc::clone(&seen);
        let doubled_clone = doubled.clone();
        let _render = Watcher::new(
            Box::new(move || {
                let v = doubled_clone.get();
                seen_inner.set(v.as_num().unwrap_or(f64::NAN));
                v
            }),
            WatcherOptions::default(),
        );
        assert_eq!(seen.get(), 2.0);

        crate::scheduler::reset();
        map.set("x", Value::num(3.0));
        crate::scheduler::flush();
        assert_eq!(seen.get(), 6.0);
    }

    #[test]
    fn teardown_freezes_value() {
        let map = observed(&[("x", 1.0)]);
        let source = map.clone();
        let tracked = Computed::new(move || source.get("x").unwrap_or(Value::Null));
        assert_eq!(tracked.get().as_num(), Some(1.0));

        tracked.teardown();
        map.set("x", Value::num(9.0));
        assert!(!tracked.is_dirty());
        assert_eq!(tracked.get().as_num(), Some(1.0));
    }
}
