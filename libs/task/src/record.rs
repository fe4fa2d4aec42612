// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{Error, Result};
use crate::id::TaskId;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// A task body entry point. `env` is an opaque pointer to the scheduler's per-thread task
/// environment (the `task` crate has no dependency on the scheduler crate, so it cannot name
/// that type); `args`/`args_len` point at the task's inline argument bytes.
///
/// # Safety
///
/// Implementations receive `env` as a type-erased pointer; callers and callees must agree out of
/// band (by construction, since a scheduler only ever installs its own entry points) on the
/// concrete type behind it.
pub type TaskMain = unsafe fn(env: *mut (), args: *const u8, args_len: u8);

/// A task's inline argument budget (spec.md §3).
pub const MAX_ARGS_BYTES: usize = 48;
/// The maximum number of tasks a single task's completion can unblock (spec.md §3).
pub const MAX_PERMITS: usize = 14;

static_assertions::const_assert_eq!(MAX_ARGS_BYTES, 48);
static_assertions::const_assert_eq!(MAX_PERMITS, 14);

/// A single task's bookkeeping and inline argument storage (spec.md §3).
///
/// Stored `CachePadded` inside a [`crate::TaskPool`]'s slab so concurrent stealers and the owner
/// never false-share a cache line with a neighboring task's record.
pub struct TaskRecord {
    /// Starts at `-(dependency count)`; reaches 0 when every dependency has completed.
    pub wait_count: AtomicI32,
    /// Starts at 2 (definition-in-progress + task body); reaches 0 when the task completes.
    pub work_count: AtomicI32,
    /// Number of valid entries in `permits`, or -1 once sealed by completion.
    pub permit_count: AtomicI32,
    pub parent_id: TaskId,
    pub task_main: Option<TaskMain>,
    args: [u8; MAX_ARGS_BYTES],
    args_len: u8,
    permits: [AtomicU32; MAX_PERMITS],
}

impl Default for TaskRecord {
    fn default() -> Self {
        Self {
            wait_count: AtomicI32::new(0),
            work_count: AtomicI32::new(0),
            permit_count: AtomicI32::new(0),
            parent_id: TaskId::INVALID,
            task_main: None,
            args: [0; MAX_ARGS_BYTES],
            args_len: 0,
            permits: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }
}

impl TaskRecord {
    /// Resets this slot for reuse as a freshly defined task with `dependency_count` unmet
    /// dependencies and `parent_id` (`TaskId::INVALID` for a top-level task).
    pub fn reinitialize(&mut self, parent_id: TaskId, dependency_count: i32) {
        self.wait_count.store(-dependency_count, Ordering::Relaxed);
        self.work_count.store(2, Ordering::Relaxed);
        self.permit_count.store(0, Ordering::Relaxed);
        self.parent_id = parent_id;
        self.task_main = None;
        self.args_len = 0;
        for permit in &self.permits {
            permit.store(0, Ordering::Relaxed);
        }
    }

    /// Copies `value`'s bytes into this record's inline argument buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataLimit`] if `value` is larger than [`MAX_ARGS_BYTES`].
    ///
    /// # Panics
    ///
    /// Never panics: the size check above guarantees `size <= MAX_ARGS_BYTES < u8::MAX`.
    pub fn set_args<T: Copy>(&mut self, value: &T) -> Result<()> {
        let size = std::mem::size_of::<T>();
        if size > MAX_ARGS_BYTES {
            return Err(Error::DataLimit {
                requested: size,
                max: MAX_ARGS_BYTES,
            });
        }
        // Safety: `size <= MAX_ARGS_BYTES`, just checked above, and `value` is a valid `&T`.
        let bytes = unsafe {
            std::slice::from_raw_parts((value as *const T).cast::<u8>(), size)
        };
        self.args[..size].copy_from_slice(bytes);
        self.args_len = u8::try_from(size).expect("size <= MAX_ARGS_BYTES <= u8::MAX");
        Ok(())
    }

    /// Reinterprets the inline argument bytes as `T`.
    ///
    /// # Safety
    ///
    /// The caller must know `T` is the same type a prior [`Self::set_args`] call wrote; this
    /// record carries no type tag of its own.
    ///
    /// # Panics
    ///
    /// Debug builds assert `size_of::<T>()` fits the bytes actually written.
    #[must_use]
    pub unsafe fn args_as<T: Copy>(&self) -> T {
        debug_assert!(std::mem::size_of::<T>() <= usize::from(self.args_len));
        // Safety: caller guarantees `T` matches what was written; alignment of `args` is only
        // `u8`, so this reads via an unaligned load.
        unsafe { self.args.as_ptr().cast::<T>().read_unaligned() }
    }

    #[must_use]
    pub fn args_len(&self) -> u8 {
        self.args_len
    }

    #[must_use]
    pub fn args_ptr(&self) -> *const u8 {
        self.args.as_ptr()
    }

    /// Atomically appends `permit` to this task's permit list (spec.md §4.H step 5's
    /// "CAS-append").
    ///
    /// Returns `Ok(true)` if appended while still unsealed, `Ok(false)` if this task had
    /// already completed (`permit_count` observed as -1) — the caller should instead directly
    /// increment `permit`'s own `wait_count`, per spec.md's fast path for late-arriving
    /// dependents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermitLimit`] if the list is already full and unsealed.
    ///
    /// # Panics
    ///
    /// Never panics: `current` is checked non-negative (the `-1`/sealed case returns early)
    /// before the `usize` conversion.
    pub fn try_append_permit(&self, permit: TaskId) -> Result<bool> {
        loop {
            let current = self.permit_count.load(Ordering::Acquire);
            if current == -1 {
                return Ok(false);
            }
            let index = usize::try_from(current).expect("permit_count is non-negative here");
            if index >= MAX_PERMITS {
                return Err(Error::PermitLimit { max: MAX_PERMITS });
            }
            if self
                .permit_count
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.permits[index].store(permit.as_u32(), Ordering::Release);
                return Ok(true);
            }
        }
    }

    /// Seals the permit list (exchanges `permit_count` to -1) and returns every permit appended
    /// before the seal, per spec.md's "permits are all read atomically at the moment of
    /// sealing".
    pub fn seal_permits(&self) -> Vec<TaskId> {
        let count = self.permit_count.swap(-1, Ordering::AcqRel);
        let count = usize::try_from(count).unwrap_or(0).min(MAX_PERMITS);
        self.permits[..count]
            .iter()
            .map(|permit| TaskId::from_u32(permit.load(Ordering::Acquire)))
            .collect()
    }
}

// Sanity bound, not a tight packing guarantee: catches an accidental doubling of the inline
// argument or permit budgets, not compiler padding choices.
static_assertions::const_assert!(std::mem::size_of::<TaskRecord>() <= 192);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_read_args_round_trip() {
        let mut record = TaskRecord::default();
        record.set_args(&(7u32, 9u64)).unwrap();
        let (a, b): (u32, u64) = unsafe { record.args_as() };
        assert_eq!((a, b), (7, 9));
    }

    #[test]
    fn oversized_args_are_rejected() {
        let mut record = TaskRecord::default();
        let err = record.set_args(&[0u8; MAX_ARGS_BYTES + 1]).unwrap_err();
        assert!(matches!(err, Error::DataLimit { .. }));
    }

    #[test]
    fn permits_append_until_full_then_fail() {
        let record = TaskRecord::default();
        for i in 0..MAX_PERMITS {
            let permit = TaskId::internal(0, u32::try_from(i).unwrap());
            assert!(record.try_append_permit(permit).unwrap());
        }
        let overflow = TaskId::internal(0, 999);
        assert!(matches!(
            record.try_append_permit(overflow),
            Err(Error::PermitLimit { .. })
        ));
    }

    #[test]
    fn sealing_stops_further_appends_and_returns_prior_permits() {
        let record = TaskRecord::default();
        record.try_append_permit(TaskId::internal(0, 1)).unwrap();
        record.try_append_permit(TaskId::internal(0, 2)).unwrap();
        let sealed = record.seal_permits();
        assert_eq!(sealed.len(), 2);
        assert!(!record.try_append_permit(TaskId::internal(0, 3)).unwrap());
    }
}
