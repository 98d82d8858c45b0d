//! Coalescing update scheduler (v0.1)
//!
//! Registry notifications are synchronous; DOM re-binding is not. Changed
//! paths are queued here and applied in one batched pass per "frame". The
//! embedder drives flushing:
//! - `render_frame()` is the animation-frame analog (flush whatever is
//!   pending), and
//! - `poll(now)` honors the fallback deadline, so a host whose frame
//!   callbacks are throttled still flushes within `FLUSH_FALLBACK` of the
//!   first enqueue.
//!
//! The scheduler owns the queue, not the application of updates; the runtime
//! context drains it (repeatedly, until empty, so updates enqueued by
//! handlers during a flush land in the same flush cycle).

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use crate::dom::Element;
use crate::path;

/// Bounded wait before `poll` force-flushes a requested frame.
pub const FLUSH_FALLBACK: Duration = Duration::from_millis(20);

/// What a queued update covers.
#[derive(Clone, Debug)]
pub enum Change {
    /// A registry path changed.
    Path(String),
    /// A subtree needs (re)binding regardless of path (fresh DOM).
    Subtree(Element),
}

/// One pending update.
#[derive(Clone, Debug)]
pub struct UpdateRecord {
    pub change: Change,
    pub source: Option<Element>,
}

#[derive(Default)]
pub struct UpdateScheduler {
    queue: RefCell<Vec<UpdateRecord>>,
    after: RefCell<Vec<Box<dyn FnOnce()>>>,
    requested_at: Cell<Option<Instant>>,
    flushing: Cell<bool>,
}

impl std::fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("pending", &self.queue.borrow().len())
            .field("flushing", &self.flushing.get())
            .finish()
    }
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update unless an existing record already covers it, in which
    /// case the existing record's source is refreshed instead.
    pub fn enqueue(&self, change: Change, source: Option<&Element>) {
        let mut queue = self.queue.borrow_mut();
        let covered = queue.iter_mut().find(|rec| match (&rec.change, &change) {
            (Change::Path(existing), Change::Path(new)) => path::is_path_prefix(existing, new),
            (Change::Subtree(existing), Change::Subtree(new)) => existing.contains(new),
            _ => false,
        });
        match covered {
            Some(rec) => rec.source = source.cloned(),
            None => queue.push(UpdateRecord {
                change,
                source: source.cloned(),
            }),
        }
        if self.requested_at.get().is_none() {
            self.requested_at.set(Some(Instant::now()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Take the pending batch. Clears the frame request when the queue
    /// empties; the flush loop calls this until it returns nothing.
    pub fn drain(&self) -> Vec<UpdateRecord> {
        let batch = std::mem::take(&mut *self.queue.borrow_mut());
        if batch.is_empty() {
            self.requested_at.set(None);
        }
        batch
    }

    /// Guard against re-entrant flushing: returns false when a flush is
    /// already running (the outer flush's drain loop will pick up whatever
    /// the re-entrant caller enqueued).
    pub fn begin_flush(&self) -> bool {
        if self.flushing.get() {
            return false;
        }
        self.flushing.set(true);
        true
    }

    pub fn end_flush(&self) {
        self.flushing.set(false);
        self.requested_at.set(None);
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Run `callback` after the next flush completes - immediately when
    /// nothing is pending. Deferred callbacks run in FIFO order.
    pub fn after_flush(&self, callback: impl FnOnce() + 'static) {
        if self.is_empty() && !self.flushing.get() {
            callback();
        } else {
            self.after.borrow_mut().push(Box::new(callback));
        }
    }

    pub fn take_after_callbacks(&self) -> Vec<Box<dyn FnOnce()>> {
        std::mem::take(&mut *self.after.borrow_mut())
    }

    /// When the pending frame must be force-flushed at the latest.
    pub fn deadline(&self) -> Option<Instant> {
        self.requested_at.get().map(|at| at + FLUSH_FALLBACK)
    }

    /// True once the fallback deadline for the pending frame has passed.
    pub fn due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }
}
