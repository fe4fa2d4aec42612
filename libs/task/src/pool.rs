// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{Error, Result};
use crate::flags::UsageFlags;
use crate::id::TaskId;
use crate::queue::WorkQueue;
use crate::record::TaskRecord;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread::ThreadId;
use util::CachePadded;

const FREE: u8 = 0;
const USED: u8 = 1;

/// A fixed-capacity slab of [`TaskRecord`]s plus the owning thread's work queue (spec.md §3,
/// §4.G).
///
/// Bound to the thread that created it: only that thread may claim a slot ([`Self::claim_slot`])
/// or mutate a claimed record ([`Self::record_mut`]). Any thread may read a live record, push
/// permits into it, or release it back to FREE once the task completes — that's how a task
/// defined on one pool can be completed by a worker running on another thread (e.g. from an I/O
/// callback).
pub struct TaskPool {
    status: Box<[AtomicU8]>,
    records: Box<[CachePadded<UnsafeCell<TaskRecord>>]>,
    queue: WorkQueue,
    /// Ready task ids produced by a thread other than this pool's owner (spec.md's
    /// `complete_task` can run on any thread). `WorkQueue::push` is owner-only, so a foreign
    /// thread deposits here instead; the owner drains it into the queue itself next time it
    /// polls (see [`Self::drain_inbox`]).
    inbox: Mutex<Vec<TaskId>>,
    owner_thread: ThreadId,
    pool_index: u32,
    usage: UsageFlags,
    next_index: AtomicUsize,
    next_worker_hint: AtomicUsize,
    #[cfg(feature = "counters")]
    counters: crate::counters::Counters,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("pool_index", &self.pool_index)
            .field("capacity", &self.capacity())
            .field("usage", &self.usage)
            .field("owner_thread", &self.owner_thread)
            .finish_non_exhaustive()
    }
}

// Safety: `records` is only mutated through `&mut TaskRecord` obtained via `record_mut`, which
// the caller may only invoke from `owner_thread` (debug-asserted). Every other access goes
// through `TaskRecord`'s own atomics or through fields that are fixed for the life of a USED
// slot and read only after observing USED via an `Acquire` load on `status`, which pairs with
// the `Release` store `claim_slot` performs when transitioning a slot to USED.
unsafe impl Sync for TaskPool {}

impl TaskPool {
    /// Creates a pool owned by the calling thread, with `capacity` task slots (must be a power
    /// of two) and the given `pool_index` (this pool's slot in the owning scheduler, embedded in
    /// every [`TaskId`] it mints).
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    #[must_use]
    pub fn new(pool_index: u32, capacity: usize, usage: UsageFlags) -> Self {
        assert!(capacity.is_power_of_two(), "TaskPool capacity must be a power of two");
        Self {
            status: (0..capacity).map(|_| AtomicU8::new(FREE)).collect(),
            records: (0..capacity)
                .map(|_| CachePadded(UnsafeCell::new(TaskRecord::default())))
                .collect(),
            queue: WorkQueue::new(capacity),
            inbox: Mutex::new(Vec::new()),
            owner_thread: std::thread::current().id(),
            pool_index,
            usage,
            next_index: AtomicUsize::new(0),
            next_worker_hint: AtomicUsize::new(0),
            #[cfg(feature = "counters")]
            counters: crate::counters::Counters::default(),
        }
    }

    /// Task lifecycle and steal counters for this pool, compiled in only under the `counters`
    /// feature.
    #[cfg(feature = "counters")]
    #[must_use]
    pub fn counters(&self) -> &crate::counters::Counters {
        &self.counters
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn pool_index(&self) -> u32 {
        self.pool_index
    }

    #[must_use]
    pub fn usage(&self) -> UsageFlags {
        self.usage
    }

    #[must_use]
    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    #[must_use]
    pub fn is_owned_by_current_thread(&self) -> bool {
        std::thread::current().id() == self.owner_thread
    }

    #[must_use]
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// A monotonically advancing hint the owning scheduler can use to round-robin steal
    /// notifications across workers (spec.md §3's "rotating 'next worker to notify' index").
    pub fn next_worker_hint(&self, worker_count: usize) -> usize {
        self.next_worker_hint.fetch_add(1, Ordering::Relaxed) % worker_count.max(1)
    }

    fn index_of(&self, id: TaskId) -> usize {
        usize::try_from(id.task_index()).expect("task_index fits in usize")
    }

    #[must_use]
    pub fn is_used(&self, id: TaskId) -> bool {
        self.status[self.index_of(id)].load(Ordering::Acquire) == USED
    }

    /// Claims the next FREE slot, starting the linear scan at the rotating `next_index` hint
    /// (spec.md §4.G).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThread`] if called from a thread other than the owner, or
    /// [`Error::TaskLimit`] if every slot is USED.
    pub fn claim_slot(&self) -> Result<TaskId> {
        if !self.is_owned_by_current_thread() {
            return Err(Error::InvalidThread);
        }
        let capacity = self.capacity();
        let start = self.next_index.load(Ordering::Relaxed) % capacity;
        for offset in 0..capacity {
            let index = (start + offset) % capacity;
            if self.status[index]
                .compare_exchange(FREE, USED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.next_index.store((index + 1) % capacity, Ordering::Relaxed);
                let task_index = u32::try_from(index).expect("index < capacity <= u32::MAX");
                #[cfg(feature = "counters")]
                self.counters.record_defined();
                return Ok(TaskId::internal(self.pool_index, task_index));
            }
        }
        Err(Error::TaskLimit)
    }

    /// Read-only access to a claimed slot's record. Any thread may call this once it has
    /// observed `id` as USED.
    #[must_use]
    pub fn record(&self, id: TaskId) -> &TaskRecord {
        // Safety: `UnsafeCell` access is shared/read-only here; concurrent owner-side mutation
        // through `record_mut` is excluded by the owner-only contract documented on that method.
        unsafe { &*self.records[self.index_of(id)].0.get() }
    }

    /// Mutable access to a claimed slot's record, for the owning thread to initialize it during
    /// task definition.
    ///
    /// # Safety
    ///
    /// The caller must be the pool's owning thread, and must not hold any other reference (via
    /// [`Self::record`]) to the same slot concurrently with this call.
    #[must_use]
    pub unsafe fn record_mut(&self, id: TaskId) -> &mut TaskRecord {
        debug_assert!(self.is_owned_by_current_thread());
        // Safety: caller upholds the owner-only, non-aliased contract documented above.
        unsafe { &mut *self.records[self.index_of(id)].0.get() }
    }

    /// Releases a USED slot back to FREE with a release store, so a subsequent `claim_slot` on
    /// the owning thread observes every write this thread made to the record (spec.md §4.G: "any
    /// thread that completes the task transitions USED→FREE via release store").
    pub fn release_slot(&self, id: TaskId) {
        self.status[self.index_of(id)].store(FREE, Ordering::Release);
        #[cfg(feature = "counters")]
        self.counters.record_completed();
    }

    /// Owner-only: pushes directly onto this pool's Chase-Lev queue.
    pub fn push(&self, id: TaskId) {
        self.queue.push(id);
    }

    /// Any thread: deposits `id` for the owner to pick up via [`Self::drain_inbox`]. Used when a
    /// task becomes ready from a thread that doesn't own its pool.
    pub fn push_cross_thread(&self, id: TaskId) {
        self.inbox.lock().push(id);
    }

    /// Owner-only: moves every inbox entry onto this pool's queue. Called once per worker-loop
    /// iteration before polling for work.
    pub fn drain_inbox(&self) {
        let mut inbox = self.inbox.lock();
        for id in inbox.drain(..) {
            self.queue.push(id);
        }
    }

    pub fn take(&self) -> Option<TaskId> {
        self.queue.take()
    }

    pub fn steal(&self) -> crate::queue::StealOutcome {
        #[cfg(feature = "counters")]
        self.counters.record_steal_attempt();
        let outcome = self.queue.steal();
        #[cfg(feature = "counters")]
        if matches!(outcome, crate::queue::StealOutcome::Success(_)) {
            self.counters.record_steal_success();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_and_release_recycles_the_slot() {
        let pool = TaskPool::new(0, 4, UsageFlags::DEFINE | UsageFlags::EXECUTE);
        let first = pool.claim_slot().unwrap();
        assert!(pool.is_used(first));
        pool.release_slot(first);
        assert!(!pool.is_used(first));
        let second = pool.claim_slot().unwrap();
        assert_eq!(first.task_index(), second.task_index());
    }

    #[test]
    fn exhausting_the_pool_returns_task_limit() {
        let pool = TaskPool::new(0, 2, UsageFlags::DEFINE);
        pool.claim_slot().unwrap();
        pool.claim_slot().unwrap();
        assert!(matches!(pool.claim_slot(), Err(Error::TaskLimit)));
    }

    #[test]
    fn claim_from_other_thread_is_rejected() {
        let pool = std::sync::Arc::new(TaskPool::new(0, 4, UsageFlags::DEFINE));
        let other = std::sync::Arc::clone(&pool);
        let result = std::thread::spawn(move || other.claim_slot()).join().unwrap();
        assert!(matches!(result, Err(Error::InvalidThread)));
    }

    #[test]
    fn record_mut_writes_are_visible_after_claim() {
        let pool = TaskPool::new(0, 4, UsageFlags::DEFINE);
        let id = pool.claim_slot().unwrap();
        // Safety: single-threaded test, called from the owning thread.
        unsafe { pool.record_mut(id) }.reinitialize(TaskId::INVALID, -2);
        assert_eq!(pool.record(id).wait_count.load(Ordering::Relaxed), -2);
    }
}
