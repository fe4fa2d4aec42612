// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Optional atomic lifecycle counters for a [`crate::TaskPool`], compiled in only under the
//! `counters` feature so profiling builds pay for them and nothing else does.

use std::sync::atomic::{AtomicU64, Ordering};

/// Definitions, completions, and steal attempts/successes observed by one [`crate::TaskPool`].
#[derive(Debug, Default)]
pub struct Counters {
    defined: AtomicU64,
    completed: AtomicU64,
    steals_attempted: AtomicU64,
    steals_succeeded: AtomicU64,
}

impl Counters {
    pub(crate) fn record_defined(&self) {
        self.defined.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_steal_attempt(&self) {
        self.steals_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_steal_success(&self) {
        self.steals_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn defined(&self) -> u64 {
        self.defined.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn steals_attempted(&self) -> u64 {
        self.steals_attempted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn steals_succeeded(&self) -> u64 {
        self.steals_succeeded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let counters = Counters::default();
        assert_eq!(counters.defined(), 0);
        counters.record_defined();
        counters.record_defined();
        counters.record_completed();
        counters.record_steal_attempt();
        counters.record_steal_success();
        assert_eq!(counters.defined(), 2);
        assert_eq!(counters.completed(), 1);
        assert_eq!(counters.steals_attempted(), 1);
        assert_eq!(counters.steals_succeeded(), 1);
    }
}
