//! Bounded FIFO queue shared between the connection handler and the workers.
//!
//! One mutex guards the ring; a condvar carries the item-available signal. The
//! stop flag lives inside the same critical section so every consumer observes
//! it on the wake-up after [`BoundedQueue::close`], never a stale copy.

use crate::request::QueuedRequest;
use parking_lot::{Condvar, Mutex};

struct Ring {
    slots: Vec<Option<QueuedRequest>>,
    head: usize,
    tail: usize,
    count: usize,
    closed: bool,
}

/// Fixed-capacity FIFO ring buffer with non-blocking admission and blocking
/// consumption.
///
/// Items leave in exactly the order they entered; the queue never reorders,
/// prioritizes, or batches. Constructed once per connection and shared by
/// reference with every worker.
pub struct BoundedQueue {
    ring: Mutex<Ring>,
    available: Condvar,
    capacity: usize,
}

impl BoundedQueue {
    /// # Panics
    ///
    /// Panics if `capacity` is zero; the CLI validates this before a queue is
    /// ever built.
    pub fn with_capacity(capacity: usize) -> BoundedQueue {
        assert!(capacity > 0, "queue capacity must be positive");
        BoundedQueue {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                count: 0,
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Attempt to admit a request without blocking.
    ///
    /// Returns the request back to the caller when the ring is full, leaving
    /// the queue untouched; the caller turns that into a rejection. On success
    /// one waiting consumer is signalled. The check and the insert happen
    /// under one lock acquisition.
    pub fn enqueue(&self, req: QueuedRequest) -> Result<(), QueuedRequest> {
        let mut ring = self.ring.lock();
        if ring.count == self.capacity {
            return Err(req);
        }
        let tail = ring.tail;
        ring.slots[tail] = Some(req);
        ring.tail = (tail + 1) % self.capacity;
        ring.count += 1;
        drop(ring);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available and pop it.
    ///
    /// A consumer may be woken with nothing to take (another consumer got
    /// there first, or the queue was closed), so the state is re-checked after
    /// every wake. Remaining items are still handed out after `close`; `None`
    /// means closed and drained, the consumer's cue to terminate.
    pub fn dequeue(&self) -> Option<QueuedRequest> {
        let mut ring = self.ring.lock();
        loop {
            if ring.count > 0 {
                let head = ring.head;
                let req = ring.slots[head].take().expect("counted slot is occupied");
                ring.head = (head + 1) % self.capacity;
                ring.count -= 1;
                return Some(req);
            }
            if ring.closed {
                return None;
            }
            self.available.wait(&mut ring);
        }
    }

    /// Ids currently queued, oldest first. Read-only; the order matches what
    /// consumers will dequeue at the instant of the call.
    pub fn snapshot_ids(&self) -> Vec<u64> {
        let ring = self.ring.lock();
        (0..ring.count)
            .map(|offset| {
                let idx = (ring.head + offset) % self.capacity;
                ring.slots[idx]
                    .as_ref()
                    .expect("counted slot is occupied")
                    .request
                    .id
            })
            .collect()
    }

    /// Mark the queue closed and wake every blocked consumer so each can
    /// observe the flag.
    pub fn close(&self) {
        let mut ring = self.ring.lock();
        ring.closed = true;
        drop(ring);
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
