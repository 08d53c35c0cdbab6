//! Bounded blocking queue
//!
//! The handoff primitive between I/O threads and consumers: transport
//! receive loops push inbound frames here, the dispatch thread drains
//! them, and each tag gets its own queue for application `recv` calls.
//!
//! Every blocking operation takes an explicit timeout so worker threads
//! can poll their stop flags; nothing blocks forever.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Bounded MPMC FIFO with timeout-based blocking push and pop.
///
/// Capacity is fixed at construction. A full queue never evicts its
/// oldest item; producers get the item back on timeout and decide
/// whether to retry or drop.
pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Push an item, blocking until there is space or `timeout` elapses.
    ///
    /// On timeout the item is returned to the caller undelivered.
    /// On success exactly one waiting consumer is woken.
    pub fn push(&self, item: T, timeout: Duration) -> Result<(), T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();

        while items.len() >= self.capacity {
            if self.not_full.wait_until(&mut items, deadline).timed_out()
                && items.len() >= self.capacity
            {
                return Err(item);
            }
        }

        items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop the oldest item, blocking until one is available or `timeout`
    /// elapses. Returns `None` on timeout.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();

        while items.is_empty() {
            if self.not_empty.wait_until(&mut items, deadline).timed_out() && items.is_empty() {
                return None;
            }
        }

        let item = items.pop_front();
        self.not_full.notify_one();
        item
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// The fixed capacity this queue was built with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
