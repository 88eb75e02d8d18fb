#![forbid(unsafe_code)]

//! Subscribers: units of reactive computation.
//!
//! A [`Watcher`] owns one evaluation function and tracks exactly the
//! dependencies that function read during its last run. Every run rebuilds
//! the subscription set from scratch: dependencies read this run are added,
//! dependencies read last run but not this run are unsubscribed. A branch of
//! a computation that stops reading a field therefore stops reacting to it.
//!
//! # Modes
//!
//! - **Always-active** (default): a change notification enqueues the watcher
//!   on the scheduler for the next flush. Used for render passes and user
//!   watch callbacks.
//! - **Lazy**: a change notification only marks the watcher dirty; the value
//!   is recomputed synchronously on the next read. Used for computed values
//!   (see the computed module).
//!
//! # Invariants
//!
//! 1. At most one evaluation of any watcher runs at a time; nested
//!    evaluations stack and restore the outer frame on completion.
//! 2. A dependency is registered at most once per run.
//! 3. A torn-down watcher never runs again and never re-enters the flush
//!    queue.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::AHashSet;

use crate::dep::{Dep, TargetStack};
use crate::scheduler;
use crate::value::{Value, loose_eq};

static NEXT_WATCHER_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

fn next_watcher_id() -> u64 {
    NEXT_WATCHER_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

/// Evaluation function of a watcher.
pub type GetterFn = Box<dyn Fn() -> Value>;

/// Change callback: receives `(new_value, old_value)`.
pub type ChangeFn = Box<dyn Fn(&Value, &Value)>;

/// Flush-cycle hook (`before` / post-flush).
pub type FlushHook = Box<dyn Fn()>;

/// Construction-time behavior switches.
#[derive(Clone, Copy, Default)]
pub struct WatcherOptions {
    /// Defer recomputation until the value is read (computed-value mode).
    pub lazy: bool,
    /// Traverse the evaluated value so every nested slot becomes a
    /// dependency.
    pub deep: bool,
    /// Skip the change callback when old and new values are deeply equal,
    /// even though the watcher was re-run.
    pub skip_loose_equal: bool,
}

struct WatcherInner {
    id: u64,
    lazy: bool,
    deep: bool,
    skip_loose_equal: bool,
    active: Cell<bool>,
    dirty: Cell<bool>,
    getter: GetterFn,
    callback: Option<ChangeFn>,
    value: RefCell<Value>,
    deps: RefCell<Vec<Dep>>,
    new_deps: RefCell<Vec<Dep>>,
    dep_ids: RefCell<AHashSet<u64>>,
    new_dep_ids: RefCell<AHashSet<u64>>,
    before: RefCell<Option<FlushHook>>,
    post_flush: RefCell<Option<FlushHook>>,
}

/// A unit of reactive computation. Cloning produces another handle to the
/// same watcher.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

/// Weak back-reference stored in dependency subscription lists. Carries the
/// id so a dead entry can still be removed without upgrading.
pub(crate) struct WatcherWeak {
    id: u64,
    inner: Weak<WatcherInner>,
}

impl WatcherWeak {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn upgrade(&self) -> Option<Watcher> {
        self.inner.upgrade().map(|inner| Watcher { inner })
    }
}

impl Watcher {
    /// An always-active or lazy watcher with no change callback.
    ///
    /// Always-active watchers evaluate eagerly on construction; lazy ones
    /// start dirty and unevaluated.
    #[must_use]
    pub fn new(getter: GetterFn, options: WatcherOptions) -> Watcher {
        Self::build(getter, None, options)
    }

    /// A watcher with a change callback, fired on re-runs that produced a
    /// different value (or any re-run, for deep watchers and container
    /// values, whose contents may have mutated in place).
    #[must_use]
    pub fn with_callback(getter: GetterFn, callback: ChangeFn, options: WatcherOptions) -> Watcher {
        Self::build(getter, Some(callback), options)
    }

    fn build(getter: GetterFn, callback: Option<ChangeFn>, options: WatcherOptions) -> Watcher {
        let watcher = Watcher {
            inner: Rc::new(WatcherInner {
                id: next_watcher_id(),
                lazy: options.lazy,
                deep: options.deep,
                skip_loose_equal: options.skip_loose_equal,
                active: Cell::new(true),
                dirty: Cell::new(options.lazy),
                getter,
                callback,
                value: RefCell::new(Value::Null),
                deps: RefCell::new(Vec::new()),
                new_deps: RefCell::new(Vec::new()),
                dep_ids: RefCell::new(AHashSet::new()),
                new_dep_ids: RefCell::new(AHashSet::new()),
                before: RefCell::new(None),
                post_flush: RefCell::new(None),
            }),
        };
        if !options.lazy {
            let value = watcher.get();
            *watcher.inner.value.borrow_mut() = value;
        }
        watcher
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.inner.lazy
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// The value cached by the last evaluation.
    #[must_use]
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Number of dependencies held since the last run.
    #[must_use]
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub(crate) fn downgrade(&self) -> WatcherWeak {
        WatcherWeak {
            id: self.inner.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Evaluate the getter with this watcher as the active frame, then diff
    /// the freshly collected dependency set against the previous run's.
    pub fn get(&self) -> Value {
        let value = {
            let _frame = TargetStack::push(Some(self.clone()));
            let value = (self.inner.getter)();
            if self.inner.deep {
                traverse(&value);
            }
            value
        };
        self.cleanup_deps();
        value
    }

    /// Record a dependency read during the current run. Idempotent per run;
    /// subscribes to the dependency only if the previous run did not already.
    pub(crate) fn add_dep(&self, dep: Dep) {
        let id = dep.id();
        {
            let mut new_ids = self.inner.new_dep_ids.borrow_mut();
            if new_ids.contains(&id) {
                return;
            }
            new_ids.insert(id);
        }
        self.inner.new_deps.borrow_mut().push(dep.clone());
        if !self.inner.dep_ids.borrow().contains(&id) {
            dep.add_sub(self);
        }
    }

    fn cleanup_deps(&self) {
        {
            let deps = self.inner.deps.borrow();
            let new_ids = self.inner.new_dep_ids.borrow();
            for dep in deps.iter() {
                if !new_ids.contains(&dep.id()) {
                    dep.remove_sub(self.inner.id);
                }
            }
        }
        std::mem::swap(
            &mut *self.inner.deps.borrow_mut(),
            &mut *self.inner.new_deps.borrow_mut(),
        );
        self.inner.new_deps.borrow_mut().clear();
        std::mem::swap(
            &mut *self.inner.dep_ids.borrow_mut(),
            &mut *self.inner.new_dep_ids.borrow_mut(),
        );
        self.inner.new_dep_ids.borrow_mut().clear();
    }

    /// Change notification entry point. Lazy watchers only go dirty;
    /// always-active watchers enqueue for the next flush.
    pub fn update(&self) {
        if self.inner.lazy {
            self.inner.dirty.set(true);
        } else {
            scheduler::queue_watcher(self);
        }
    }

    /// Scheduler entry point: re-evaluate and fire the callback if the value
    /// changed. Containers and deep watchers always count as changed — their
    /// contents may have mutated in place behind an identical handle.
    pub(crate) fn run(&self) {
        if !self.inner.active.get() {
            return;
        }
        let value = self.get();
        let old = self.inner.value.borrow().clone();
        if !value.same(&old) || value.is_container() || self.inner.deep {
            *self.inner.value.borrow_mut() = value.clone();
            if let Some(callback) = &self.inner.callback {
                if self.inner.skip_loose_equal && loose_eq(&value, &old) {
                    return;
                }
                callback(&value, &old);
            }
        }
    }

    /// Synchronously recompute a lazy watcher if it is dirty, then return the
    /// cached value.
    pub fn evaluate(&self) -> Value {
        if self.inner.dirty.get() {
            let value = self.get();
            *self.inner.value.borrow_mut() = value;
            self.inner.dirty.set(false);
        }
        self.value()
    }

    /// Forward every dependency of this watcher to the currently-active
    /// subscriber. Reading a computed value from inside another computation
    /// makes the outer computation depend on everything the computed one
    /// reads.
    pub fn depend(&self) {
        let deps = self.inner.deps.borrow().clone();
        for dep in &deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency and deactivate. Pending flush
    /// entries for a torn-down watcher are no-ops.
    pub fn teardown(&self) {
        if !self.inner.active.get() {
            return;
        }
        tracing::debug!(target: "reflow", id = self.inner.id, "watcher torn down");
        for dep in self.inner.deps.borrow().iter() {
            dep.remove_sub(self.inner.id);
        }
        self.inner.deps.borrow_mut().clear();
        self.inner.dep_ids.borrow_mut().clear();
        self.inner.active.set(false);
    }

    /// Install a hook run right before this watcher's re-run during a flush.
    pub fn set_before(&self, hook: FlushHook) {
        *self.inner.before.borrow_mut() = Some(hook);
    }

    /// Install a hook run after the whole flush this watcher took part in.
    pub fn set_post_flush(&self, hook: FlushHook) {
        *self.inner.post_flush.borrow_mut() = Some(hook);
    }

    pub(crate) fn call_before(&self) {
        if let Some(hook) = &*self.inner.before.borrow() {
            hook();
        }
    }

    pub(crate) fn call_post_flush(&self) {
        if let Some(hook) = &*self.inner.post_flush.borrow() {
            hook();
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("active", &self.inner.active.get())
            .field("lazy", &self.inner.lazy)
            .field("dirty", &self.inner.dirty.get())
            .field("deps", &self.inner.deps.borrow().len())
            .finish()
    }
}

// ─── Deep traversal ──────────────────────────────────────────────────────────

/// Read every nested slot of `value` through the tracked accessors, so the
/// active watcher subscribes to all of them. Cycles are cut on observer
/// identity.
pub fn traverse(value: &Value) {
    let mut seen: AHashSet<u64> = AHashSet::new();
    traverse_value(value, &mut seen);
}

fn traverse_value(value: &Value, seen: &mut AHashSet<u64>) {
    match value {
        Value::Map(map) => {
            if let Some(dep) = value.observer_dep() {
                if !seen.insert(dep.id()) {
                    return;
                }
            }
            for key in map.keys() {
                if let Some(child) = map.get(&key) {
                    traverse_value(&child, seen);
                }
            }
        }
        Value::List(list) => {
            if let Some(dep) = value.observer_dep() {
                if !seen.insert(dep.id()) {
                    return;
                }
            }
            list.depend();
            for item in list.items_snapshot() {
                traverse_value(&item, seen);
            }
        }
        _ => {}
    }
}

// ─── Path getters ────────────────────────────────────────────────────────────

fn valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$')
}

/// Build a getter reading a dotted path (`"a.b.c"`) from a root value
/// through the tracked accessors. Returns `None` (callers warn) when the
/// path contains characters outside `[word . $]`. Missing segments yield
/// `Null`.
#[must_use]
pub fn path_getter(root: &Value, path: &str) -> Option<GetterFn> {
    if !valid_path(path) {
        return None;
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    let root = root.clone();
    Some(Box::new(move || {
        let mut current = root.clone();
        for segment in &segments {
            let next = match &current {
                Value::Map(map) => map.get(segment),
                _ => None,
            };
            current = match next {
                Some(v) => v,
                None => return Value::Null,
            };
        }
        current
    }))
}
