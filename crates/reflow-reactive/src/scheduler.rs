#![forbid(unsafe_code)]

//! Batching of subscriber re-runs into one cooperative flush.
//!
//! Watchers notified synchronously within the same window are queued,
//! deduplicated by id, and run once at the next cooperative yield point. The
//! host owns the yield: it calls [`flush`] when its current synchronous work
//! completes (an event-loop turn, a frame boundary, a test checkpoint).
//!
//! # Queueing policy
//!
//! - First enqueue of a window schedules the queue drain as a [`next_tick`]
//!   callback.
//! - Enqueues while the queue is pending but not draining are appended if not
//!   already present.
//! - Enqueues while the queue is draining are inserted in id order after the
//!   cursor, so they run within the same flush — even when the id was already
//!   processed (no missed update, at the cost of possible extra work).
//! - A watcher re-queued more than [`MAX_UPDATE_COUNT`] times in one flush is
//!   treated as a runaway cycle: reported, and the flush aborted rather than
//!   allowed to hang.
//!
//! After every watcher in a flush has run, post-flush hooks run once per
//! flushed owner, in flushed order.

use std::cell::{Cell, RefCell};

use ahash::{AHashMap, AHashSet};
use reflow_core::warn;

use crate::watcher::Watcher;

/// Re-queue ceiling per watcher per flush before the cycle is reported.
pub const MAX_UPDATE_COUNT: usize = 100;

struct QueueState {
    queue: Vec<Watcher>,
    has: AHashSet<u64>,
    circular: AHashMap<u64, usize>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

impl QueueState {
    fn new() -> Self {
        QueueState {
            queue: Vec::new(),
            has: AHashSet::new(),
            circular: AHashMap::new(),
            waiting: false,
            flushing: false,
            index: 0,
        }
    }
}

type TickCallback = Box<dyn FnOnce()>;

thread_local! {
    static QUEUE: RefCell<QueueState> = RefCell::new(QueueState::new());
    static CALLBACKS: RefCell<Vec<TickCallback>> = const { RefCell::new(Vec::new()) };
    static PENDING: Cell<bool> = const { Cell::new(false) };
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Register a callback for the next cooperative yield point.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().push(Box::new(callback)));
    PENDING.set(true);
}

/// Whether any work (queued watchers or tick callbacks) awaits the next
/// flush.
#[must_use]
pub fn has_pending() -> bool {
    PENDING.get()
}

/// The cooperative yield point. Runs the callbacks registered since the last
/// flush — including the scheduled queue drain — in registration order.
/// Callbacks registered *during* the flush wait for the next one. Re-entrant
/// calls are no-ops.
pub fn flush() {
    if DRAINING.get() {
        return;
    }
    DRAINING.set(true);
    let callbacks: Vec<TickCallback> = CALLBACKS.with(|callbacks| std::mem::take(&mut *callbacks.borrow_mut()));
    PENDING.set(false);
    for callback in callbacks {
        callback();
    }
    DRAINING.set(false);
    // Work scheduled mid-flush keeps the pending flag for the next yield.
    if CALLBACKS.with(|callbacks| !callbacks.borrow().is_empty()) {
        PENDING.set(true);
    }
}

/// Clear all scheduler state. Intended for tests and host teardown.
pub fn reset() {
    QUEUE.with(|queue| *queue.borrow_mut() = QueueState::new());
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().clear());
    PENDING.set(false);
    DRAINING.set(false);
}

/// Enqueue a watcher for the next flush. Duplicate requests within one window
/// collapse into a single run. Torn-down watchers are refused.
pub fn queue_watcher(watcher: &Watcher) {
    if !watcher.is_active() {
        return;
    }
    let id = watcher.id();
    let schedule = QUEUE.with(|queue| {
        let mut state = queue.borrow_mut();
        if state.has.contains(&id) {
            return false;
        }
        state.has.insert(id);
        if !state.flushing {
            state.queue.push(watcher.clone());
        } else {
            // Insert in id order, but never before the cursor: a watcher with
            // an already-processed id still re-runs in this flush.
            let mut i = state.queue.len();
            while i > state.index + 1 && state.queue[i - 1].id() > id {
                i -= 1;
            }
            state.queue.insert(i, watcher.clone());
        }
        if state.waiting {
            false
        } else {
            state.waiting = true;
            true
        }
    });
    if schedule {
        next_tick(flush_queue);
    }
}

fn flush_queue() {
    let queued = QUEUE.with(|queue| {
        let mut state = queue.borrow_mut();
        state.flushing = true;
        state.index = 0;
        // Ascending id order: computed values before the render passes that
        // read them, parents before children.
        state.queue.sort_by_key(Watcher::id);
        state.queue.len()
    });
    tracing::trace!(target: "reflow", queued, "flush start");

    loop {
        let next = QUEUE.with(|queue| {
            let mut state = queue.borrow_mut();
            if state.index >= state.queue.len() {
                return None;
            }
            let watcher = state.queue[state.index].clone();
            // Allow the watcher to re-queue itself from its own run.
            state.has.remove(&watcher.id());
            Some(watcher)
        });
        let Some(watcher) = next else { break };

        watcher.call_before();
        watcher.run();

        let runaway = QUEUE.with(|queue| {
            let mut state = queue.borrow_mut();
            let id = watcher.id();
            if state.has.contains(&id) {
                let count = state.circular.entry(id).or_insert(0);
                *count += 1;
                if *count > MAX_UPDATE_COUNT {
                    return true;
                }
            }
            state.index += 1;
            false
        });
        if runaway {
            warn(&format!(
                "aborting flush: watcher {} re-queued itself more than {MAX_UPDATE_COUNT} times \
                 (possible infinite update loop)",
                watcher.id()
            ));
            break;
        }
    }

    let flushed = QUEUE.with(|queue| {
        let mut state = queue.borrow_mut();
        let snapshot: Vec<Watcher> = state.queue.clone();
        state.queue.clear();
        state.has.clear();
        state.circular.clear();
        state.index = 0;
        state.waiting = false;
        state.flushing = false;
        snapshot
    });

    // Post-flush hooks: once per owner, in flushed order.
    let mut called: AHashSet<u64> = AHashSet::new();
    for watcher in &flushed {
        if watcher.is_active() && called.insert(watcher.id()) {
            watcher.call_post_flush();
        }
    }
    tracing::trace!(target: "reflow", flushed = flushed.len(), "flush end");
}
