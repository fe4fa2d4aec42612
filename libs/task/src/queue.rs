// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The canonical Chase-Lev bounded work-stealing deque (spec.md §4.F). The fences here are
//! load-bearing — do not weaken them; this is a direct transcription of the published
//! algorithm's ordering, not a simplification of it.

use crate::id::TaskId;
use crate::loom::atomic::{fence, AtomicI64, AtomicU32, Ordering};
use util::CachePadded;

/// Outcome of a [`WorkQueue::steal`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealOutcome {
    /// Got a task.
    Success(TaskId),
    /// The queue was observed empty.
    Empty,
    /// Lost a race with the owner or another stealer; the caller should retry.
    Retry,
}

/// A single-owner, multi-stealer bounded deque of [`TaskId`]s (spec.md §3, §4.F).
///
/// Only the owning thread may call [`Self::push`]/[`Self::take`]; any thread may call
/// [`Self::steal`].
pub struct WorkQueue {
    public: CachePadded<AtomicI64>,
    private: CachePadded<AtomicI64>,
    mask: i64,
    buffer: Box<[AtomicU32]>,
}

impl WorkQueue {
    /// Creates a queue with room for `capacity` task ids.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "WorkQueue capacity must be a power of two");
        Self {
            public: CachePadded(AtomicI64::new(0)),
            private: CachePadded(AtomicI64::new(0)),
            mask: i64::try_from(capacity - 1).expect("capacity fits in i64"),
            buffer: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn slot(&self, index: i64) -> usize {
        usize::try_from(index & self.mask).expect("masked index is non-negative and in range")
    }

    /// Owner-only: pushes `id` onto the private end.
    pub fn push(&self, id: TaskId) {
        let private = self.private.load(Ordering::Relaxed);
        let slot = self.slot(private);
        self.buffer[slot].store(id.as_u32(), Ordering::Relaxed);
        fence(Ordering::Release);
        self.private.store(private + 1, Ordering::Relaxed);
    }

    /// Owner-only: takes from the private end, racing any concurrent stealer only on the very
    /// last element. Returns `None` if the queue was empty.
    pub fn take(&self) -> Option<TaskId> {
        let private = self.private.load(Ordering::Relaxed);
        let b = private - 1;
        self.private.store(b, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let t = self.public.load(Ordering::Relaxed);

        if t > b {
            // Empty: restore private to the public cursor.
            self.private.store(t, Ordering::Relaxed);
            return None;
        }

        let value = TaskId::from_u32(self.buffer[self.slot(b)].load(Ordering::Relaxed));

        if t < b {
            return Some(value);
        }

        // t == b: exactly one element left, race a concurrent stealer for it.
        let won = self
            .public
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();
        self.private.store(t + 1, Ordering::Relaxed);
        won.then_some(value)
    }

    /// Any thread: a snapshot count of entries not yet taken or stolen. Racy against concurrent
    /// push/take/steal on other threads, but exact once nothing else touches the queue (e.g.
    /// while waiting for a pool to drain before tearing it down).
    #[must_use]
    pub fn len(&self) -> usize {
        let b = self.private.load(Ordering::Acquire);
        let t = self.public.load(Ordering::Acquire);
        usize::try_from((b - t).max(0)).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Any thread: attempts to steal from the public end.
    pub fn steal(&self) -> StealOutcome {
        let t = self.public.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let b = self.private.load(Ordering::Acquire);

        if t >= b {
            return StealOutcome::Empty;
        }

        let value = TaskId::from_u32(self.buffer[self.slot(t)].load(Ordering::Relaxed));
        match self
            .public
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => StealOutcome::Success(value),
            Err(_) => StealOutcome::Retry,
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_capacity_panics() {
        WorkQueue::new(3);
    }

    #[test]
    fn push_then_take_round_trips() {
        let queue = WorkQueue::new(4);
        let id = TaskId::internal(0, 5);
        queue.push(id);
        assert_eq!(queue.take(), Some(id));
        assert_eq!(queue.take(), None);
    }

    #[test]
    fn take_is_lifo() {
        let queue = WorkQueue::new(4);
        queue.push(TaskId::internal(0, 1));
        queue.push(TaskId::internal(0, 2));
        assert_eq!(queue.take(), Some(TaskId::internal(0, 2)));
        assert_eq!(queue.take(), Some(TaskId::internal(0, 1)));
    }

    #[test]
    fn steal_is_fifo_relative_to_push_order() {
        let queue = WorkQueue::new(4);
        queue.push(TaskId::internal(0, 1));
        queue.push(TaskId::internal(0, 2));
        assert_eq!(queue.steal(), StealOutcome::Success(TaskId::internal(0, 1)));
        assert_eq!(queue.steal(), StealOutcome::Success(TaskId::internal(0, 2)));
        assert_eq!(queue.steal(), StealOutcome::Empty);
    }

    #[test]
    fn concurrent_steal_drains_exactly_once() {
        use std::sync::Arc;
        use std::thread;

        let queue = Arc::new(WorkQueue::new(1024));
        for i in 0..500 {
            queue.push(TaskId::internal(0, i));
        }

        let stolen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let stolen = Arc::clone(&stolen);
            handles.push(thread::spawn(move || loop {
                match queue.steal() {
                    StealOutcome::Success(_) => {
                        stolen.fetch_add(1, Ordering::Relaxed);
                    }
                    StealOutcome::Empty => break,
                    StealOutcome::Retry => continue,
                }
            }));
        }

        let mut taken = 0;
        while queue.take().is_some() {
            taken += 1;
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(taken + stolen.load(Ordering::Relaxed), 500);
    }
}

// Model-checks the owner/stealer race on the last element, the one interleaving the plain
// stress test above can't guarantee it hits. Kept to a tiny capacity and thread count: Loom's
// state space is exponential in both.
#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use crate::loom::{model, thread};
    use std::sync::Arc;

    #[test]
    fn owner_take_races_one_stealer_on_last_element() {
        model(|| {
            let queue = Arc::new(WorkQueue::new(2));
            queue.push(TaskId::internal(0, 1));

            let stealer_queue = Arc::clone(&queue);
            let stealer = thread::spawn(move || stealer_queue.steal());

            let taken = queue.take();
            let stolen = stealer.join().unwrap();

            let taken_it = taken.is_some();
            let stole_it = matches!(stolen, StealOutcome::Success(_));
            assert!(taken_it ^ stole_it, "exactly one of take/steal must win the last element");
        });
    }
}
