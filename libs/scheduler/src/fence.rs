// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An external task whose completion signals a manual-reset event an OS thread can block on
//! (spec.md §4.I).

use crate::env::TaskEnv;
use crate::error::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task::TaskId;

/// A sentinel meaning "wait forever" (spec.md §5: "a maximum-value sentinel means infinite").
pub const INFINITE: u64 = u64::MAX;

struct Signal {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

/// An external task completed by the scheduler itself once all its dependencies finish, whose
/// completion wakes any thread blocked in [`Fence::wait`].
pub struct Fence {
    signal: Arc<Signal>,
    id: TaskId,
}

/// # Safety
///
/// Must only be installed as the `task_main` of a task whose inline args were written by
/// [`Fence::create`], i.e. exactly one `*const Signal` pointer produced by `Arc::into_raw`.
unsafe fn signal_entry(_env: *mut (), args: *const u8, _args_len: u8) {
    // Safety: `args` points at exactly one `*const Signal` pointer written by `Fence::create`
    // via `spawn_task`'s `set_args`, read back with the same layout.
    let signal_ptr = unsafe { args.cast::<*const Signal>().read_unaligned() };
    // Safety: `signal_ptr` came from `Arc::into_raw` in `Fence::create`, which handed this task
    // body exactly one strong reference to reclaim.
    let signal = unsafe { Arc::from_raw(signal_ptr) };
    *signal.signaled.lock() = true;
    signal.condvar.notify_all();
}

impl Fence {
    /// Spawns a task with `dependencies` whose entry point signals this fence once they all
    /// complete (spec.md §4.I: "allocate event; spawn a task with the supplied dependencies and
    /// the fence-signal entry point").
    ///
    /// # Errors
    ///
    /// See [`TaskEnv::define_task`].
    pub fn create(env: &TaskEnv, dependencies: &[TaskId]) -> Result<Self> {
        let signal = Arc::new(Signal {
            signaled: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let signal_ptr = Arc::into_raw(Arc::clone(&signal));
        let id = env.spawn_task(signal_entry, &signal_ptr, dependencies)?;
        Ok(Self { signal, id })
    }

    /// Blocks the calling OS thread until this fence signals or `timeout` elapses.
    ///
    /// Passing [`INFINITE`] waits forever. Returns `true` if the fence signaled, `false` on
    /// timeout (spec.md §8 "Fence laws").
    #[must_use]
    pub fn wait(&self, timeout_nanos: u64) -> bool {
        let mut signaled = self.signal.signaled.lock();
        if *signaled {
            return true;
        }
        if timeout_nanos == INFINITE {
            while !*signaled {
                self.signal.condvar.wait(&mut signaled);
            }
            return true;
        }
        let deadline = Instant::now() + Duration::from_nanos(timeout_nanos);
        while !*signaled {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return *signaled;
            };
            let result = self.signal.condvar.wait_for(&mut signaled, remaining);
            if result.timed_out() && !*signaled {
                return false;
            }
        }
        true
    }

    /// Clears the signal so this fence's task id can be reused with a fresh set of dependencies
    /// via [`Self::create`] (spec.md §8 "`reset_fence` after wait allows reuse").
    pub fn reset(&self) {
        *self.signal.signaled.lock() = false;
    }

    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.id
    }
}
