// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;

/// A condition-variable-backed substitute for a native completion port (spec.md §9: "Implementers
/// without a native completion port can substitute one condition-variable-per-worker plus a victim
/// hint; semantics are identical"). Here a single shared queue plays the same role: [`Self::post`]
/// pushes a key and wakes one waiter, [`Self::wait`] blocks until one is available.
pub struct CompletionPort {
    queue: Mutex<VecDeque<usize>>,
    condvar: Condvar,
}

impl CompletionPort {
    pub fn create() -> io::Result<Self> {
        Ok(Self {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        })
    }

    /// Posts a completion event carrying `key`, used both to wake a worker for a freshly
    /// submitted request and to deliver the shutdown sentinel.
    pub fn post(&self, key: usize) -> io::Result<()> {
        self.queue.lock().push_back(key);
        self.condvar.notify_one();
        Ok(())
    }

    /// Blocks until a completion event is available and returns its key.
    pub fn wait(&self) -> io::Result<usize> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(key) = queue.pop_front() {
                return Ok(key);
            }
            self.condvar.wait(&mut queue);
        }
    }
}
