#![forbid(unsafe_code)]

//! Dependencies: per-slot subscription lists fanning change notifications out
//! to the computations that read the slot.
//!
//! A [`Dep`] is an identity-only token owning an ordered set of subscriber
//! back-references. One exists per observed mapping slot, plus one per
//! observed container for "the container's shape changed".
//!
//! # Invariants
//!
//! 1. Subscribers are held weakly; dead entries are pruned lazily during
//!    notification, never eagerly.
//! 2. A subscriber appears at most once per dependency (the watcher's id
//!    bookkeeping guarantees single registration per run).
//! 3. Notification visits live subscribers in ascending id order. Ids follow
//!    creation order, so computations created earlier (computed values) are
//!    told about a change before the computations that read them (render
//!    passes).
//! 4. `depend` outside any active computation is a no-op.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::watcher::{Watcher, WatcherWeak};

static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(1);

fn next_dep_id() -> u64 {
    NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed)
}

/// A subscription list keyed to one observable slot.
///
/// Cloning a `Dep` creates another handle to the same subscription list.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

struct DepInner {
    id: u64,
    subs: RefCell<SmallVec<[WatcherWeak; 4]>>,
}

impl Dep {
    #[must_use]
    pub fn new() -> Self {
        Dep {
            inner: Rc::new(DepInner {
                id: next_dep_id(),
                subs: RefCell::new(SmallVec::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of currently-live subscribers.
    #[must_use]
    pub fn sub_count(&self) -> usize {
        self.inner
            .subs
            .borrow()
            .iter()
            .filter(|weak| weak.upgrade().is_some())
            .count()
    }

    pub(crate) fn add_sub(&self, watcher: &Watcher) {
        self.inner.subs.borrow_mut().push(watcher.downgrade());
    }

    pub(crate) fn remove_sub(&self, watcher_id: u64) {
        self.inner.subs.borrow_mut().retain(|weak| weak.id() != watcher_id);
    }

    /// Register the active subscriber, if any, as a listener of this
    /// dependency and record the reverse link on the subscriber. No-op when
    /// nothing is being tracked (reads outside any computation).
    pub fn depend(&self) {
        if let Some(target) = TargetStack::current() {
            target.add_dep(self.clone());
        }
    }

    /// Ask every live subscriber to re-schedule itself, in ascending id
    /// order. Dead weak entries are pruned as a side effect.
    pub fn notify(&self) {
        let mut live: Vec<Watcher> = Vec::new();
        {
            let mut subs = self.inner.subs.borrow_mut();
            subs.retain(|weak| match weak.upgrade() {
                Some(watcher) => {
                    live.push(watcher);
                    true
                }
                None => false,
            });
        }
        live.sort_by_key(Watcher::id);
        for watcher in &live {
            watcher.update();
        }
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Dep {}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subs", &self.inner.subs.borrow().len())
            .finish()
    }
}

// ─── Target stack ────────────────────────────────────────────────────────────

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// The explicit stack of computation frames for the current thread.
///
/// Exactly one subscriber is "active" at a time; nesting restores the outer
/// frame on completion. A `None` frame disables tracking entirely — lifecycle
/// hooks and data initializers run under one so their incidental reads do not
/// subscribe anything.
pub struct TargetStack;

/// RAII frame: pops on drop, so an unwinding computation cannot leave its
/// frame behind.
pub(crate) struct TargetFrame {
    _private: (),
}

impl Drop for TargetFrame {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl TargetStack {
    pub(crate) fn push(frame: Option<Watcher>) -> TargetFrame {
        TARGET_STACK.with(|stack| stack.borrow_mut().push(frame));
        TargetFrame { _private: () }
    }

    /// The currently-active subscriber, if tracking is enabled.
    #[must_use]
    pub fn current() -> Option<Watcher> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Whether a subscriber is currently collecting dependencies.
    #[must_use]
    pub fn is_tracking() -> bool {
        Self::current().is_some()
    }

    /// Run `f` with dependency collection disabled.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _frame = Self::push(None);
        f()
    }
}
