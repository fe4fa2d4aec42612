// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::flags::ProtectionFlags;
use std::io;
use std::ptr::NonNull;

/// Queries the OS page size.
#[must_use]
pub fn page_size() -> usize {
    // Safety: `_SC_PAGESIZE` is a pure query with no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(4096)
}

/// Unix has no separate allocation-granularity concept distinct from the page size; mirrored
/// here so callers can stay platform-agnostic.
#[must_use]
pub fn allocation_granularity() -> usize {
    page_size()
}

fn mmap_protection(flags: ProtectionFlags) -> i32 {
    let mut prot = libc::PROT_NONE;
    if flags.contains(ProtectionFlags::READ) {
        prot |= libc::PROT_READ;
    }
    if flags.contains(ProtectionFlags::WRITE) {
        prot |= libc::PROT_WRITE;
    }
    if flags.contains(ProtectionFlags::EXECUTE) {
        prot |= libc::PROT_EXEC;
    }
    prot
}

/// Reserves `size` bytes of address space as `PROT_NONE`, committing nothing.
///
/// # Errors
///
/// Returns the OS error if the mapping could not be created.
pub fn reserve(size: usize) -> io::Result<NonNull<u8>> {
    // Safety: anonymous, fixed-size mapping with no backing file; `base` is only ever used as
    // an opaque handle for later `mprotect`/`munmap` calls over the same range.
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_NONE,
            libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
            -1,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(base.cast::<u8>()).ok_or_else(io::Error::last_os_error)
}

/// "Commits" `size` bytes starting at `base` by granting it real access protection.
///
/// Unix has no separate reserve/commit distinction at the syscall level (anonymous pages are
/// backed lazily by the kernel on first touch regardless); this only flips the protection bits
/// so the range matches the Host Memory Pool's reserve/commit model.
///
/// # Errors
///
/// Returns the OS error if `mprotect` failed.
///
/// # Safety
///
/// `base` must point into a range previously returned by [`reserve`] and not yet [`release`]d,
/// and `[base, base+size)` must lie within that reservation.
pub unsafe fn commit(base: NonNull<u8>, size: usize, flags: ProtectionFlags) -> io::Result<()> {
    let prot = mmap_protection(flags);
    // Safety: caller upholds the range precondition.
    let ret = unsafe { libc::mprotect(base.as_ptr().cast(), size, prot) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Commits a guard page of `size` bytes at `base` as `PROT_NONE`, faulting on first touch
/// instead of silently overrunning into the next reservation.
///
/// # Safety
///
/// Same preconditions as [`commit`].
pub unsafe fn commit_guard_page(base: NonNull<u8>, size: usize) -> io::Result<()> {
    // Safety: caller upholds the range precondition; a `PROT_NONE` region needs no commit step
    // distinct from `reserve`, but we still assert the mapping is addressable.
    let ret = unsafe { libc::mprotect(base.as_ptr().cast(), size, libc::PROT_NONE) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Releases an entire reservation previously returned by [`reserve`].
///
/// # Safety
///
/// `base`/`size` must exactly match a prior [`reserve`] call.
pub unsafe fn release(base: NonNull<u8>, size: usize) {
    // Safety: caller upholds the precondition.
    let ret = unsafe { libc::munmap(base.as_ptr().cast(), size) };
    debug_assert_eq!(ret, 0, "munmap failed on a reservation we own");
}

/// Flushes the instruction cache over `[base, base+size)`.
///
/// x86/x86_64 keep the instruction cache coherent with data writes in hardware, so this is a
/// no-op there; other architectures that self-modify code would need an explicit cache-line
/// flush instruction sequence, which this platform layer does not target.
///
/// # Safety
///
/// `base` must point at committed memory within a live reservation.
#[allow(
    unused_variables,
    reason = "base/size are part of the public signature for platform symmetry"
)]
pub unsafe fn flush_icache(base: NonNull<u8>, size: usize) {}
