// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::flags::ProtectionFlags;
use std::ptr::NonNull;

/// A contiguous range of reserved process address space with a committed prefix.
///
/// Invariants (spec.md §3): `bytes_committed <= bytes_reserved`; `base` is page-aligned; if
/// [`ProtectionFlags::GUARD_PAGE`] was requested, one extra page past `bytes_reserved` is
/// committed with guard protection and is *not* counted in `bytes_reserved`/`bytes_committed`.
#[derive(Debug)]
pub struct Reservation {
    pub(crate) base: NonNull<u8>,
    /// Total length of the underlying OS mapping, including the trailing guard page if any.
    /// Needed to release the mapping exactly as it was created.
    pub(crate) mapped_len: usize,
    pub(crate) bytes_reserved: usize,
    pub(crate) bytes_committed: usize,
    pub(crate) flags: ProtectionFlags,
    pub(crate) has_guard_page: bool,
    /// Identifies the pool this reservation was acquired from, so [`crate::HostMemoryPool`] can
    /// detect a double-release against the wrong pool (spec.md §4.A).
    pub(crate) pool_id: u64,
    /// Index of the owning slot inside the pool's slot array.
    pub(crate) slot: u32,
}

// Safety: a `Reservation` is a plain descriptor of address-space ownership; the caller is
// responsible for synchronizing access to the underlying bytes, exactly as with a raw pointer.
unsafe impl Send for Reservation {}

impl Reservation {
    /// Base address of the reservation.
    #[must_use]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Bytes of address space reserved, not counting a trailing guard page.
    #[must_use]
    pub fn bytes_reserved(&self) -> usize {
        self.bytes_reserved
    }

    /// Bytes currently committed, starting at `base`.
    #[must_use]
    pub fn bytes_committed(&self) -> usize {
        self.bytes_committed
    }

    #[must_use]
    pub fn flags(&self) -> ProtectionFlags {
        self.flags
    }

    #[must_use]
    pub fn has_guard_page(&self) -> bool {
        self.has_guard_page
    }

    /// Returns the committed prefix as a byte slice.
    ///
    /// # Safety
    ///
    /// The caller must not hold any other live reference into the committed range, and must
    /// not read uninitialized bytes as if they were initialized.
    #[must_use]
    pub unsafe fn as_slice(&self) -> &[u8] {
        // Safety: `bytes_committed` bytes starting at `base` are committed and owned by this
        // reservation for as long as it's alive; caller upholds aliasing.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.bytes_committed) }
    }

    /// Returns the committed prefix as a mutable byte slice.
    ///
    /// # Safety
    ///
    /// The caller must hold exclusive access to the committed range for the lifetime of the
    /// returned slice.
    #[must_use]
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: see `as_slice`; caller upholds exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.bytes_committed) }
    }
}
