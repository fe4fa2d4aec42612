// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use bitflags::bitflags;

bitflags! {
    /// How a [`crate::TaskPool`] participates in its scheduler (spec.md §3).
    ///
    /// `DEFINE` lets callers define tasks against this pool; `EXECUTE` lets its owning thread run
    /// them from its local queue; `PUBLISH` requires a steal notification whenever a task becomes
    /// ready but the pool cannot run it locally; `WORKER` marks pools a scheduler auto-binds its
    /// worker threads to (at most one pool type may set this).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct UsageFlags: u8 {
        const DEFINE  = 1 << 0;
        const EXECUTE = 1 << 1;
        const PUBLISH = 1 << 2;
        const WORKER  = 1 << 3;
    }
}
