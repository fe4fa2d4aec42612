// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::scheduler::Inner;
use arena::Arena;
use std::cell::RefCell;
use std::sync::Arc;
use task::TaskPool;

/// The thread-local execution context delivered to every task body (spec.md §4.H).
///
/// Carries a reference to the thread's own pool, its local scratch arena (reset before each
/// task), the shared global arena, and everything a task body needs to spawn more work, submit
/// I/O, or complete other tasks. Exactly one `TaskEnv` exists per pool; it lives for as long as
/// that pool does.
pub struct TaskEnv {
    pub(crate) pool: Arc<TaskPool>,
    local_arena: RefCell<Arena>,
    inner: Arc<Inner>,
    user_context: *mut (),
}

// Safety: `user_context` is an opaque pointer the caller supplies and is responsible for
// synchronizing; `TaskEnv` never dereferences it, only hands it back out through
// `Self::user_context`.
unsafe impl Send for TaskEnv {}

impl TaskEnv {
    pub(crate) fn new(
        pool: Arc<TaskPool>,
        local_arena_size: usize,
        inner: Arc<Inner>,
        user_context: *mut (),
    ) -> Self {
        Self {
            pool,
            local_arena: RefCell::new(Arena::new(local_arena_size)),
            inner,
            user_context,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }

    #[must_use]
    pub fn request_pool(&self) -> &Arc<io_pool::RequestPool> {
        &self.inner.request_pool
    }

    #[must_use]
    pub fn io_pool(&self) -> &Arc<io_pool::IoThreadPool> {
        &self.inner.io_pool
    }

    #[must_use]
    pub(crate) fn scheduler(&self) -> &Arc<Inner> {
        &self.inner
    }

    /// Runs `id` and everything that becomes ready transitively, on this thread, until `id`
    /// itself has fully completed — including all of its children (spec.md §4.H
    /// `wait_for_task`). Never blocks the OS thread; if there is no local or stealable work it
    /// busy-polls `target`'s completion state.
    pub fn wait_for_task(&self, target: task::TaskId) {
        self.inner.wait_for_task(self, target);
    }

    /// Defines a top-level internal task on this thread's pool. See [`crate::Scheduler::define_task`].
    ///
    /// # Errors
    ///
    /// See [`crate::Scheduler::define_task`].
    pub fn define_task<T: Copy>(
        &self,
        task_main: task::TaskMain,
        args: &T,
        dependencies: &[task::TaskId],
    ) -> crate::Result<task::TaskId> {
        self.inner.define_task(&self.pool, task::TaskId::INVALID, task_main, args, dependencies)
    }

    /// Defines a child task of `parent`, bumping `parent`'s `work_count` first. See
    /// [`crate::Scheduler::define_child_task`].
    ///
    /// # Errors
    ///
    /// See [`crate::Scheduler::define_child_task`].
    pub fn define_child_task<T: Copy>(
        &self,
        parent: task::TaskId,
        task_main: task::TaskMain,
        args: &T,
        dependencies: &[task::TaskId],
    ) -> crate::Result<task::TaskId> {
        self.inner.bump_parent_work_count(parent)?;
        self.inner.define_task(&self.pool, parent, task_main, args, dependencies)
    }

    /// # Errors
    ///
    /// See [`crate::Scheduler::finish_task_definition`].
    pub fn finish_task_definition(&self, id: task::TaskId) -> crate::Result<()> {
        self.inner.finish_task_definition(id)
    }

    /// Combines [`Self::define_task`] and [`Self::finish_task_definition`] for the common case of
    /// a task with no further setup between definition and becoming runnable.
    ///
    /// # Errors
    ///
    /// See [`crate::Scheduler::define_task`].
    pub fn spawn_task<T: Copy>(
        &self,
        task_main: task::TaskMain,
        args: &T,
        dependencies: &[task::TaskId],
    ) -> crate::Result<task::TaskId> {
        let id = self.define_task(task_main, args, dependencies)?;
        self.finish_task_definition(id)?;
        Ok(id)
    }

    /// # Errors
    ///
    /// See [`crate::Scheduler::complete_task`].
    pub fn complete_task(&self, id: task::TaskId) -> crate::Result<usize> {
        self.inner.complete_task(id)
    }

    /// Allocates `size` bytes aligned to `alignment` from this pool's scratch arena.
    ///
    /// # Errors
    ///
    /// Returns [`arena::Error::ArenaExhausted`] if the local arena cannot satisfy the request.
    pub fn allocate_local(&self, size: usize, alignment: usize) -> arena::Result<util::MemoryRange> {
        self.local_arena.borrow_mut().allocate(size, alignment)
    }

    /// Resets this pool's local arena, discarding every outstanding allocation. Called by the
    /// worker loop before each task body runs (spec.md §5: "each task pool has a local arena
    /// reset before each task").
    pub(crate) fn reset_local_arena(&self) {
        self.local_arena.borrow_mut().reset();
    }

    /// Read-only access to the scheduler-wide global arena's backing bytes.
    ///
    /// # Safety
    ///
    /// The caller must not read past `populate_global_arena`'s own writes at scheduler startup
    /// (see [`crate::Scheduler::create`]), since bytes beyond that are uninitialized.
    #[must_use]
    pub unsafe fn global_arena_bytes(&self) -> &[u8] {
        // Safety: `global_arena_base`/`global_arena_len` describe a committed reservation owned
        // by the scheduler for at least as long as this `TaskEnv` (which holds an `Arc<Inner>`)
        // is alive; caller upholds the initialized-prefix contract documented above.
        unsafe {
            std::slice::from_raw_parts(self.inner.global_arena_base.as_ptr(), self.inner.global_arena_len)
        }
    }

    #[must_use]
    pub fn user_context(&self) -> *mut () {
        self.user_context
    }
}
