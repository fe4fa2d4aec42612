// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use bitflags::bitflags;

bitflags! {
    /// Protection and layout flags for a [`crate::Reservation`].
    ///
    /// `READ`/`WRITE`/`EXECUTE` select the union of accesses the OS mapping allows.
    /// `GUARD_PAGE` asks [`crate::HostMemoryPool::acquire`] to append one extra page past the
    /// reserved range and commit it with guard protection, so a hot-path overrun faults instead
    /// of silently corrupting the next reservation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ProtectionFlags: u8 {
        const READ       = 1 << 0;
        const WRITE      = 1 << 1;
        const EXECUTE    = 1 << 2;
        const GUARD_PAGE = 1 << 3;
    }
}

impl Default for ProtectionFlags {
    fn default() -> Self {
        Self::READ | Self::WRITE
    }
}
