// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The task scheduler: pool-type registry, worker fleet, and the task lifecycle operations that
//! run on top of [`task::TaskPool`] and [`task::WorkQueue`] (spec.md §4.H).

use crate::env::TaskEnv;
use crate::error::{Error, Result};
use crate::pool_type::PoolTypeDesc;
use parking_lot::{Mutex, RwLock};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use task::{TaskId, TaskMain, TaskPool, UsageFlags};

const SHUTDOWN_KEY: usize = usize::MAX;
const STEAL_ATTEMPTS_ON_VICTIM: u32 = 4;

/// Construction parameters for a [`Scheduler`] (spec.md §4.H "Pool types").
pub struct SchedulerInit {
    pub pool_types: Vec<PoolTypeDesc>,
    /// Byte size of the scheduler-wide global arena, written once at startup.
    pub global_arena_size: usize,
    /// Worker count for the shared I/O thread pool backing `submit_request`.
    pub io_worker_count: usize,
}

struct PoolTypeRuntime {
    desc: PoolTypeDesc,
    index_start: u32,
    /// Slots in `[index_start, index_start + desc.pool_count)` not currently backed by a live
    /// `TaskPool` (spec.md §5: "pool-type free lists... guarded by critical sections").
    available: Mutex<usize>,
}

/// Shared scheduler state, reachable from every worker thread and every [`TaskEnv`] (spec.md
/// §4.H). Lives for as long as any worker thread or outstanding `TaskEnv` does; the owning
/// [`Scheduler`] joins every worker before this is finally dropped.
pub struct Inner {
    pools: Box<[RwLock<Option<Arc<TaskPool>>>]>,
    pool_type_of: Box<[usize]>,
    pool_types: Vec<PoolTypeRuntime>,
    worker_count: usize,
    worker_ports: Box<[Arc<io_pool::CompletionPort>]>,
    io_pool: Arc<io_pool::IoThreadPool>,
    request_pool: Arc<io_pool::RequestPool>,
    pub(crate) global_arena_base: NonNull<u8>,
    pub(crate) global_arena_len: usize,
    shutting_down: AtomicBool,
}

// Safety: `global_arena_base` points at a committed reservation owned by the `Scheduler` this
// `Inner` belongs to, for at least as long as any `Arc<Inner>` clone (held by a worker thread or
// a `TaskEnv`) is alive; the bytes are written once before any thread observes this `Inner` and
// are read-only thereafter (spec.md §5).
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("pool_count", &self.pools.len())
            .field("pool_type_count", &self.pool_types.len())
            .field("worker_count", &self.worker_count)
            .field("shutting_down", &self.shutting_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn pool_by_index(&self, index: usize) -> Option<Arc<TaskPool>> {
        self.pools.get(index)?.read().clone()
    }

    fn pool_for(&self, id: TaskId) -> Result<Arc<TaskPool>> {
        let index = usize::try_from(id.pool_index()).expect("pool_index fits in usize");
        self.pool_by_index(index).ok_or(Error::InvalidTask)
    }

    /// Allocates a fresh `TaskPool` bound to the calling thread into a free slot of `type_id`'s
    /// range.
    ///
    /// `TaskPool` binds its owner at construction and never rebinds, so unlike the source's
    /// literal free list of interchangeable pool objects, this free list tracks *capacity*, not
    /// physical objects: each call mints a new `TaskPool` for whichever thread claims the slot.
    /// See DESIGN.md. A pool type with [`UsageFlags::WORKER`] set never has any available
    /// capacity: its slots are claimed once by the scheduler's own worker threads at `create`
    /// time and held for the scheduler's lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolTypeExhausted`] if every pool of `type_id` is currently checked out.
    pub fn allocate_task_pool(&self, type_id: usize) -> Result<Arc<TaskPool>> {
        let runtime = self
            .pool_types
            .get(type_id)
            .ok_or(Error::PoolTypeExhausted { type_id })?;
        let mut available = runtime.available.lock();
        if *available == 0 {
            return Err(Error::PoolTypeExhausted { type_id });
        }
        for offset in 0..runtime.desc.pool_count {
            let index = usize::try_from(runtime.index_start).expect("index fits in usize") + offset;
            let mut slot = self.pools[index].write();
            if slot.is_none() {
                let index_u32 = u32::try_from(index).expect("pool_index fits in u32");
                let pool = Arc::new(TaskPool::new(index_u32, runtime.desc.task_capacity, runtime.desc.usage));
                *slot = Some(Arc::clone(&pool));
                *available -= 1;
                return Ok(pool);
            }
        }
        unreachable!("pool-type available counter desynchronized from slot occupancy")
    }

    /// Returns `pool` to its type's free list. The physical `TaskPool` is dropped; a later
    /// `allocate_task_pool` for the same type mints a new one bound to whatever thread claims it.
    ///
    /// Must be called from `pool`'s owning thread (the one that checked it out), the same
    /// requirement [`TaskPool::drain_inbox`] and [`TaskPool::push`] already carry. Blocks until
    /// every task still ready in `pool`'s queue has been taken by a worker: dropping the pool
    /// while ready `TaskId`s remain in its deque would strand them, since `pool_by_index` stops
    /// seeing this slot the moment the slot is cleared below (spec.md §8 scenario 5).
    pub fn return_task_pool(&self, pool: Arc<TaskPool>) {
        let index = usize::try_from(pool.pool_index()).expect("pool_index fits in usize");
        let type_id = self.pool_type_of[index];
        loop {
            pool.drain_inbox();
            if pool.queue().is_empty() {
                break;
            }
            std::hint::spin_loop();
        }
        drop(pool);
        *self.pools[index].write() = None;
        *self.pool_types[type_id].available.lock() += 1;
    }

    fn publish_tasks(&self, pool: &Arc<TaskPool>, count: usize) {
        for _ in 0..count {
            let worker = pool.next_worker_hint(self.worker_count.max(1));
            let key = usize::try_from(pool.pool_index()).expect("pool_index fits in usize");
            let _ = self.worker_ports[worker].post(key);
        }
    }

    fn ready_dependent(&self, pool: &Arc<TaskPool>, id: TaskId) {
        if pool.is_owned_by_current_thread() {
            pool.push(id);
        } else {
            pool.push_cross_thread(id);
        }
    }

    /// Task definition steps 1-6 (spec.md §4.H). Runs on `pool`'s owning thread (enforced by
    /// [`TaskPool::claim_slot`]).
    pub(crate) fn define_task<T: Copy>(
        &self,
        pool: &Arc<TaskPool>,
        parent_id: TaskId,
        task_main: TaskMain,
        args: &T,
        dependencies: &[TaskId],
    ) -> Result<TaskId> {
        let dependency_count = i32::try_from(dependencies.len()).expect("dependency count fits in i32");
        let id = pool.claim_slot()?;
        // Safety: `id` was just claimed by this call, on the owning thread, and is not yet
        // visible to any other thread.
        let record = unsafe { pool.record_mut(id) };
        record.reinitialize(parent_id, dependency_count);
        record.task_main = Some(task_main);
        record.set_args(args)?;

        let mut became_ready = dependencies.is_empty();
        for &dependency in dependencies {
            let dependency_pool = self.pool_for(dependency)?;
            let dependency_record = dependency_pool.record(dependency);
            if !dependency_record.try_append_permit(id)? {
                // Dependency already completed (permit_count sealed to -1): fast path, this
                // dependency's contribution to wait_count is already satisfied. Ready the task
                // ourselves only if this fetch_add is the one that drives the -1 -> 0 transition,
                // the same edge `retire` triggers on; a dependency that completes concurrently on
                // another thread during this loop may win that transition instead, in which case
                // its own `retire` call readies this task and we must not ready it again.
                let previous = pool.record(id).wait_count.fetch_add(1, Ordering::AcqRel);
                if previous == -1 {
                    became_ready = true;
                }
            }
        }

        if became_ready {
            self.ready_dependent(pool, id);
            if !pool.usage().contains(UsageFlags::EXECUTE) {
                self.publish_tasks(pool, 1);
            }
        }

        Ok(id)
    }

    pub(crate) fn bump_parent_work_count(&self, parent: TaskId) -> Result<()> {
        let parent_pool = self.pool_for(parent)?;
        parent_pool.record(parent).work_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Decrements `work_count` from its definition-time hold; if that drives it to 0 (the task
    /// body already ran), cascades completion immediately (spec.md §4.H `finish_definition`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTask`] if `id` does not address a live task.
    pub fn finish_task_definition(&self, id: TaskId) -> Result<()> {
        let pool = self.pool_for(id)?;
        let previous = pool.record(id).work_count.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.retire(&pool, id);
        }
        Ok(())
    }

    /// Atomically decrements `work_count`; if it transitions to 0, seals permits, readies every
    /// dependent, recursively completes the parent, and releases the slot (spec.md §4.H
    /// `complete_task`). Returns the number of dependents newly readied onto `id`'s own pool, so
    /// a caller on a non-executing pool knows how many steal notifications to publish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTask`] if `id` does not address a live task.
    pub fn complete_task(&self, id: TaskId) -> Result<usize> {
        let pool = self.pool_for(id)?;
        let previous = pool.record(id).work_count.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            Ok(self.retire(&pool, id))
        } else {
            Ok(0)
        }
    }

    /// The shared tail of `finish_task_definition` and `complete_task` once `work_count` has hit
    /// zero: seal permits, ready dependents, complete the parent, release the slot.
    fn retire(&self, pool: &Arc<TaskPool>, id: TaskId) -> usize {
        let record = pool.record(id);
        let sealed = record.seal_permits();
        let parent_id = record.parent_id;

        let mut newly_ready_local = 0;
        for permit in sealed {
            let Ok(permit_pool) = self.pool_for(permit) else {
                continue;
            };
            let previous = permit_pool.record(permit).wait_count.fetch_add(1, Ordering::AcqRel);
            if previous == -1 {
                self.ready_dependent(&permit_pool, permit);
                if Arc::ptr_eq(&permit_pool, pool) {
                    newly_ready_local += 1;
                }
            }
        }

        if parent_id.is_valid() {
            let _ = self.complete_task(parent_id);
        }

        pool.release_slot(id);

        if newly_ready_local > 0 && !pool.usage().contains(UsageFlags::EXECUTE) {
            self.publish_tasks(pool, newly_ready_local);
        }

        newly_ready_local
    }

    fn steal_from(&self, pool: &Arc<TaskPool>) -> Option<TaskId> {
        for _ in 0..STEAL_ATTEMPTS_ON_VICTIM {
            match pool.steal() {
                task::StealOutcome::Success(id) => return Some(id),
                task::StealOutcome::Empty => return None,
                task::StealOutcome::Retry => continue,
            }
        }
        None
    }

    fn steal_any(&self, skip_index: usize) -> Option<TaskId> {
        for index in 0..self.pools.len() {
            if index == skip_index {
                continue;
            }
            let Some(victim) = self.pool_by_index(index) else {
                continue;
            };
            if let Some(id) = self.steal_from(&victim) {
                return Some(id);
            }
        }
        None
    }

    fn execute(&self, env: &TaskEnv, id: TaskId) {
        // `id` was very likely stolen from another pool, so its record lives in that pool's own
        // slab, not `env.pool()`'s — look it up by the pool_index baked into `id` itself.
        let Ok(pool) = self.pool_for(id) else { return };
        let (task_main, args_ptr, args_len) = {
            let record = pool.record(id);
            (
                record.task_main.expect("a runnable task always has an entry point"),
                record.args_ptr(),
                record.args_len(),
            )
        };
        let env_ptr = std::ptr::from_ref(env).cast_mut().cast::<()>();
        // Safety: `task_main` was installed by `define_task` alongside `args_ptr`/`args_len`
        // describing the same task's argument buffer; `env_ptr` addresses a live `TaskEnv` for
        // the duration of this call.
        unsafe { task_main(env_ptr, args_ptr, args_len) };
        let _ = self.complete_task(id);
    }

    /// spec.md §4.H `wait_for_task`: never enters an OS wait, runs local or stolen work until
    /// `target` completes.
    pub(crate) fn wait_for_task(&self, env: &TaskEnv, target: TaskId) {
        let Ok(target_pool) = self.pool_for(target) else {
            return;
        };
        while target_pool.is_used(target) {
            env.pool().drain_inbox();
            let id = env
                .pool()
                .take()
                .or_else(|| self.steal_any(usize::try_from(env.pool().pool_index()).expect("fits")));
            match id {
                Some(id) => self.execute(env, id),
                None => std::hint::spin_loop(),
            }
        }
    }

    fn worker_loop(inner: &Arc<Inner>, env: &TaskEnv, port: &io_pool::CompletionPort) {
        loop {
            let Ok(key) = port.wait() else { break };
            if key == SHUTDOWN_KEY {
                // Other notifications may still be queued behind this sentinel (posted by this
                // worker's own cascading completions), and other pools may still hold ready work
                // this worker can steal: run all of it to completion before actually exiting
                // (spec.md §5 "drains workers that then exit").
                Self::drain_all_ready_work(inner, env);
                break;
            }

            let my_index = usize::try_from(env.pool().pool_index()).expect("fits");
            let victim_index = key;
            let victim = inner.pool_by_index(victim_index);

            let mut task = victim.as_ref().and_then(|victim| inner.steal_from(victim));
            if task.is_none() {
                task = inner.steal_any(my_index);
            }
            let Some(mut task_id) = task else { continue };

            loop {
                env.reset_local_arena();
                inner.execute(env, task_id);
                env.pool().drain_inbox();
                match env.pool().take() {
                    Some(next) => task_id = next,
                    None => break,
                }
            }
        }
    }

    /// Runs every task this worker can still reach — its own queue, then every other pool via
    /// stealing — until a full sweep turns up nothing, so no ready task is ever abandoned at
    /// shutdown (spec.md §8 scenario 5: every spawned task's body runs exactly once before
    /// `destroy` returns).
    fn drain_all_ready_work(inner: &Arc<Inner>, env: &TaskEnv) {
        let my_index = usize::try_from(env.pool().pool_index()).expect("fits");
        loop {
            env.pool().drain_inbox();
            if let Some(id) = env.pool().take() {
                env.reset_local_arena();
                inner.execute(env, id);
                continue;
            }
            if let Some(id) = inner.steal_any(my_index) {
                env.reset_local_arena();
                inner.execute(env, id);
                continue;
            }
            break;
        }
    }
}

/// The multi-pool task scheduler (spec.md §4.H). Owns the worker thread fleet, the shared I/O
/// thread pool, and the scheduler-wide global arena.
pub struct Scheduler {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
    global_memory: mempool::HostMemoryPool,
    global_reservation: Option<mempool::Reservation>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_count", &self.worker_count())
            .field("global_arena_len", &self.inner.global_arena_len)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Builds the scheduler: validates exactly one pool type carries [`UsageFlags::WORKER`],
    /// reserves and commits the global arena, then spawns one worker thread per pool of the
    /// worker type, each binding its own `TaskPool` on first run.
    ///
    /// `populate_global_arena` runs synchronously against the freshly committed global arena
    /// bytes before any worker thread starts, matching spec.md §5's "global arena is written
    /// once at scheduler startup; reads are lock-free thereafter".
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPoolTypeCount`] if the descriptor count with `UsageFlags::WORKER`
    /// set is not exactly one, [`Error::TooManyPools`] if a descriptor's address range would
    /// overflow [`task::MAX_POOLS`], or an underlying memory/I/O error if construction fails.
    pub fn create(
        init: SchedulerInit,
        populate_global_arena: impl FnOnce(&mut arena::Arena, &mut [u8]),
    ) -> Result<Self> {
        let worker_type_count = init.pool_types.iter().filter(|desc| desc.usage.contains(UsageFlags::WORKER)).count();
        if worker_type_count != 1 {
            return Err(Error::WorkerPoolTypeCount { found: worker_type_count });
        }

        let total_pools: usize = init.pool_types.iter().map(|desc| desc.pool_count).sum();
        if total_pools > task::MAX_POOLS {
            return Err(Error::TooManyPools {
                index: init.pool_types.len(),
                requested: total_pools,
            });
        }

        let mut pools = Vec::with_capacity(total_pools);
        let mut pool_type_of = Vec::with_capacity(total_pools);
        let mut pool_types = Vec::with_capacity(init.pool_types.len());
        let mut worker_count = 0;
        let mut index_cursor = 0u32;

        for desc in &init.pool_types {
            let index_start = index_cursor;
            for _ in 0..desc.pool_count {
                pools.push(RwLock::new(None));
                pool_type_of.push(pool_types.len());
                index_cursor += 1;
            }
            if desc.usage.contains(UsageFlags::WORKER) {
                worker_count = desc.pool_count;
            }
            // Worker-type slots are claimed directly by their dedicated worker thread below and
            // never returned, so they are never available for `allocate_task_pool` to hand out.
            let available = if desc.usage.contains(UsageFlags::WORKER) { 0 } else { desc.pool_count };
            pool_types.push(PoolTypeRuntime {
                desc: desc.clone(),
                index_start,
                available: Mutex::new(available),
            });
        }

        let request_pool_size: usize = init.pool_types.iter().map(|desc| desc.io_request_pool_size).sum();
        let request_pool = Arc::new(io_pool::RequestPool::create(request_pool_size.max(1)));
        let io_pool = Arc::new(io_pool::IoThreadPool::create(init.io_worker_count, Arc::clone(&request_pool))?);

        let mut global_memory = mempool::HostMemoryPool::create(1, init.global_arena_size.max(1), 0, "scheduler-global-arena");
        let mut global_reservation = global_memory.acquire(
            init.global_arena_size.max(1),
            init.global_arena_size.max(1),
            mempool::ProtectionFlags::default(),
        )?;
        {
            let mut arena = arena::Arena::new(global_reservation.bytes_committed());
            // Safety: `global_reservation` was just committed in full above and is not yet
            // shared with any other thread.
            let bytes = unsafe { global_reservation.as_mut_slice() };
            populate_global_arena(&mut arena, bytes);
        }
        let global_arena_base = global_reservation.base();
        let global_arena_len = global_reservation.bytes_committed();

        let worker_ports = (0..worker_count)
            .map(|_| io_pool::CompletionPort::create().map(Arc::new).map_err(io_pool::Error::IoOpenFailed))
            .collect::<io_pool::Result<Vec<_>>>()?;

        let inner = Arc::new(Inner {
            pools: pools.into_boxed_slice(),
            pool_type_of: pool_type_of.into_boxed_slice(),
            pool_types,
            worker_count,
            worker_ports: worker_ports.into_boxed_slice(),
            io_pool,
            request_pool,
            global_arena_base,
            global_arena_len,
            shutting_down: AtomicBool::new(false),
        });

        let worker_type_index = init
            .pool_types
            .iter()
            .position(|desc| desc.usage.contains(UsageFlags::WORKER))
            .expect("validated above: exactly one WORKER pool type exists");
        let worker_desc = init.pool_types[worker_type_index].clone();
        let worker_index_start = inner.pool_types[worker_type_index].index_start;

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        let mut workers = Vec::with_capacity(worker_count);
        for offset in 0..worker_count {
            let inner = Arc::clone(&inner);
            let desc = worker_desc.clone();
            let ready_tx = ready_tx.clone();
            let pool_index = worker_index_start + u32::try_from(offset).expect("offset fits in u32");
            let port = Arc::clone(&inner.worker_ports[offset]);
            let handle = std::thread::Builder::new()
                .name(format!("scheduler-worker-{offset}"))
                .spawn(move || {
                    let pool = Arc::new(TaskPool::new(pool_index, desc.task_capacity, desc.usage));
                    *inner.pools[usize::try_from(pool_index).expect("fits")].write() = Some(Arc::clone(&pool));
                    let env = TaskEnv::new(pool, desc.local_arena_size, Arc::clone(&inner), std::ptr::null_mut());
                    let _ = ready_tx.send(());
                    tracing::trace!(worker = offset, "scheduler worker started");
                    Inner::worker_loop(&inner, &env, &port);
                    tracing::trace!(worker = offset, "scheduler worker exiting");
                })
                .expect("failed to spawn scheduler worker thread");
            workers.push(handle);
        }
        drop(ready_tx);
        for _ in 0..worker_count {
            let _ = ready_rx.recv();
        }

        Ok(Self {
            inner,
            workers,
            global_memory,
            global_reservation: Some(global_reservation),
        })
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Read-only access to the scheduler-wide global arena's committed bytes.
    #[must_use]
    pub fn global_arena_bytes(&self) -> &[u8] {
        // Safety: `global_arena_base`/`global_arena_len` were committed once in `create` and
        // are never mutated afterward.
        unsafe { std::slice::from_raw_parts(self.inner.global_arena_base.as_ptr(), self.inner.global_arena_len) }
    }

    /// Checks out a non-worker task pool for `type_id`, bound to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolTypeExhausted`] if every pool of that type is checked out.
    pub fn allocate_task_pool(&self, type_id: usize) -> Result<Arc<TaskPool>> {
        self.inner.allocate_task_pool(type_id)
    }

    pub fn return_task_pool(&self, pool: Arc<TaskPool>) {
        self.inner.return_task_pool(pool);
    }

    /// Creates a [`TaskEnv`] for `pool`, so code outside a worker thread (e.g. the thread that
    /// called [`Self::allocate_task_pool`]) can define, spawn, and wait on tasks through the same
    /// API a worker body sees.
    #[must_use]
    pub fn attach(&self, pool: Arc<TaskPool>, local_arena_size: usize, user_context: *mut ()) -> TaskEnv {
        TaskEnv::new(pool, local_arena_size, Arc::clone(&self.inner), user_context)
    }

    /// Creates an external task: never pushed to a queue, completed only by an explicit
    /// [`TaskEnv::complete_task`]/[`Inner::complete_task`] call (spec.md §4.H "External tasks").
    ///
    /// # Errors
    ///
    /// See [`Self::attach`]'s pool and [`task::TaskPool::claim_slot`]'s errors.
    pub fn create_external_task<T: Copy>(&self, pool: &Arc<TaskPool>, args: &T) -> Result<TaskId> {
        self.create_external_child_task(pool, TaskId::INVALID, args)
    }

    /// # Errors
    ///
    /// See [`Self::create_external_task`].
    pub fn create_external_child_task<T: Copy>(
        &self,
        pool: &Arc<TaskPool>,
        parent: TaskId,
        args: &T,
    ) -> Result<TaskId> {
        if parent.is_valid() {
            self.inner.bump_parent_work_count(parent)?;
        }
        let id = pool.claim_slot()?;
        // Safety: `id` was just claimed on the calling (owning) thread and is not yet visible
        // to any other thread.
        let record = unsafe { pool.record_mut(id) };
        record.reinitialize(parent, 0);
        // An external task has no body for a worker to run, so there is only one completion
        // event instead of the two a defined task has (body finishing, definition finishing):
        // the external caller's single `complete_task` call. Start the hold at 1, not
        // `reinitialize`'s default of 2, so that one call is enough to retire it.
        record.work_count.store(1, std::sync::atomic::Ordering::Relaxed);
        record.task_main = None;
        record.set_args(args)?;
        Ok(id)
    }

    /// # Errors
    ///
    /// See [`Inner::complete_task`].
    pub fn complete_task(&self, id: TaskId) -> Result<usize> {
        self.inner.complete_task(id)
    }

    /// Signals every worker to exit once it drains its current task chain, and blocks until
    /// they have (spec.md §5 "scheduler posts shutdown sentinels to every worker's port, then
    /// joins").
    pub fn terminate(&mut self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        for port in &self.inner.worker_ports {
            let _ = port.post(SHUTDOWN_KEY);
        }
    }

    /// Terminates the scheduler, joins every worker, and releases the global arena's reservation.
    pub fn destroy(mut self) {
        self.terminate();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.inner.io_pool.terminate();
        if let Some(reservation) = self.global_reservation.take() {
            self.global_memory.release(reservation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::{Fence, INFINITE};
    use std::sync::atomic::AtomicU32;

    /// One auto-bound worker pool plus one client-checkout pool type, so a test thread can define
    /// tasks (owner-only) while the scheduler's own worker thread executes them.
    fn single_worker_init() -> SchedulerInit {
        SchedulerInit {
            pool_types: vec![
                PoolTypeDesc {
                    pool_count: 1,
                    task_capacity: 16,
                    local_arena_size: 4096,
                    io_request_pool_size: 4,
                    usage: UsageFlags::EXECUTE | UsageFlags::WORKER,
                },
                PoolTypeDesc {
                    pool_count: 1,
                    task_capacity: 16,
                    local_arena_size: 4096,
                    io_request_pool_size: 4,
                    usage: UsageFlags::DEFINE,
                },
            ],
            global_arena_size: 4096,
            io_worker_count: 1,
        }
    }

    const CLIENT_POOL_TYPE: usize = 1;

    unsafe fn increment(env: *mut (), args: *const u8, _args_len: u8) {
        let counter = unsafe { args.cast::<*const AtomicU32>().read_unaligned() };
        let _ = env;
        unsafe { (*counter).fetch_add(1, Ordering::Relaxed) };
    }

    #[test]
    fn create_and_destroy_an_idle_scheduler() {
        let scheduler = Scheduler::create(single_worker_init(), |_arena, _bytes| {}).unwrap();
        assert_eq!(scheduler.worker_count(), 1);
        scheduler.destroy();
    }

    #[test]
    fn global_arena_is_populated_before_any_worker_runs() {
        let scheduler = Scheduler::create(single_worker_init(), |_arena, bytes| {
            bytes[0] = 42;
        })
        .unwrap();
        assert_eq!(scheduler.global_arena_bytes()[0], 42);
        scheduler.destroy();
    }

    #[test]
    fn diamond_dependency_runs_every_task_exactly_once() {
        let scheduler = Scheduler::create(single_worker_init(), |_arena, _bytes| {}).unwrap();
        let pool = scheduler.allocate_task_pool(CLIENT_POOL_TYPE).unwrap();
        let env = scheduler.attach(pool, 256, std::ptr::null_mut());

        let counter = AtomicU32::new(0);
        let counter_ptr: *const AtomicU32 = &counter;

        let root = env.spawn_task(increment, &counter_ptr, &[]).unwrap();
        let left = env.spawn_task(increment, &counter_ptr, &[root]).unwrap();
        let right = env.spawn_task(increment, &counter_ptr, &[root]).unwrap();
        let join = env.spawn_task(increment, &counter_ptr, &[left, right]).unwrap();

        env.wait_for_task(join);
        assert_eq!(counter.load(Ordering::Relaxed), 4);

        scheduler.return_task_pool(Arc::clone(env.pool()));
        drop(env);
        scheduler.destroy();
    }

    #[test]
    fn external_task_only_completes_on_explicit_complete_call() {
        let scheduler = Scheduler::create(single_worker_init(), |_arena, _bytes| {}).unwrap();
        let pool = scheduler.allocate_task_pool(CLIENT_POOL_TYPE).unwrap();
        let env = scheduler.attach(Arc::clone(&pool), 256, std::ptr::null_mut());

        let counter = AtomicU32::new(0);
        let counter_ptr: *const AtomicU32 = &counter;
        let external = scheduler.create_external_task(&pool, &0u8).unwrap();
        let dependent = env.spawn_task(increment, &counter_ptr, &[external]).unwrap();

        assert!(pool.is_used(dependent));
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        scheduler.complete_task(external).unwrap();
        env.wait_for_task(dependent);
        assert_eq!(counter.load(Ordering::Relaxed), 1);

        scheduler.return_task_pool(pool);
        scheduler.destroy();
    }

    #[test]
    fn external_child_task_bumps_parent_work_count() {
        let scheduler = Scheduler::create(single_worker_init(), |_arena, _bytes| {}).unwrap();
        let pool = scheduler.allocate_task_pool(CLIENT_POOL_TYPE).unwrap();
        let env = scheduler.attach(Arc::clone(&pool), 256, std::ptr::null_mut());

        let counter = AtomicU32::new(0);
        let counter_ptr: *const AtomicU32 = &counter;
        let parent = env.define_task(increment, &counter_ptr, &[]).unwrap();
        let child = scheduler.create_external_child_task(&pool, parent, &0u8).unwrap();
        env.finish_task_definition(parent).unwrap();

        // Parent's body may already have run by now (it has no real dependency on the child other
        // than the work_count hold), but it cannot retire until the external child also
        // completes, so the counter is still short of the worker-confirmed run at this point.
        scheduler.complete_task(child).unwrap();
        env.wait_for_task(parent);
        assert_eq!(counter.load(Ordering::Relaxed), 1);

        scheduler.return_task_pool(pool);
        scheduler.destroy();
    }

    #[test]
    fn fence_wait_unblocks_once_dependencies_complete() {
        let scheduler = Scheduler::create(single_worker_init(), |_arena, _bytes| {}).unwrap();
        let pool = scheduler.allocate_task_pool(CLIENT_POOL_TYPE).unwrap();
        let env = scheduler.attach(Arc::clone(&pool), 256, std::ptr::null_mut());

        let counter = AtomicU32::new(0);
        let counter_ptr: *const AtomicU32 = &counter;
        let a = env.spawn_task(increment, &counter_ptr, &[]).unwrap();
        let b = env.spawn_task(increment, &counter_ptr, &[]).unwrap();

        let fence = Fence::create(&env, &[a, b]).unwrap();
        env.wait_for_task(fence.task_id());
        assert!(fence.wait(INFINITE));
        assert_eq!(counter.load(Ordering::Relaxed), 2);

        fence.reset();
        assert!(!fence.wait(1));

        scheduler.return_task_pool(pool);
        scheduler.destroy();
    }

    #[test]
    fn pool_type_exhaustion_is_reported() {
        let init = SchedulerInit {
            pool_types: vec![
                PoolTypeDesc {
                    pool_count: 1,
                    task_capacity: 4,
                    local_arena_size: 256,
                    io_request_pool_size: 1,
                    usage: UsageFlags::WORKER | UsageFlags::EXECUTE,
                },
                PoolTypeDesc {
                    pool_count: 1,
                    task_capacity: 4,
                    local_arena_size: 256,
                    io_request_pool_size: 1,
                    usage: UsageFlags::DEFINE,
                },
            ],
            global_arena_size: 64,
            io_worker_count: 1,
        };
        let scheduler = Scheduler::create(init, |_arena, _bytes| {}).unwrap();
        let first = scheduler.allocate_task_pool(1).unwrap();
        assert!(matches!(
            scheduler.allocate_task_pool(1),
            Err(Error::PoolTypeExhausted { type_id: 1 })
        ));
        scheduler.return_task_pool(first);
        assert!(scheduler.allocate_task_pool(1).is_ok());
        scheduler.destroy();
    }

    #[test]
    fn create_rejects_wrong_worker_pool_type_count() {
        let init = SchedulerInit {
            pool_types: vec![PoolTypeDesc {
                pool_count: 1,
                task_capacity: 4,
                local_arena_size: 256,
                io_request_pool_size: 1,
                usage: UsageFlags::DEFINE,
            }],
            global_arena_size: 64,
            io_worker_count: 1,
        };
        assert!(matches!(
            Scheduler::create(init, |_arena, _bytes| {}),
            Err(Error::WorkerPoolTypeCount { found: 0 })
        ));
    }
}
