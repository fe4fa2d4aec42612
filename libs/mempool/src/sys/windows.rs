// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::flags::ProtectionFlags;
use std::io;
use std::ptr::NonNull;
use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
use windows_sys::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_GUARD,
    PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE, VirtualAlloc, VirtualFree,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

/// Queries the OS page size. On all currently supported Windows targets this is 4 KiB, but we
/// still ask rather than hard-code it.
#[must_use]
pub fn page_size() -> usize {
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info.dwPageSize as usize
    }
}

/// The granularity at which the OS is willing to place independent reservations
/// (`dwAllocationGranularity`, typically 64 KiB on Windows).
#[must_use]
pub fn allocation_granularity() -> usize {
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info.dwAllocationGranularity as usize
    }
}

fn page_protection(flags: ProtectionFlags) -> u32 {
    let exec = flags.contains(ProtectionFlags::EXECUTE);
    let write = flags.contains(ProtectionFlags::WRITE);
    let read = flags.contains(ProtectionFlags::READ);
    match (exec, write, read) {
        (true, true, _) => PAGE_EXECUTE_READWRITE,
        (true, false, _) => PAGE_EXECUTE_READ,
        (false, true, _) => PAGE_READWRITE,
        (false, false, true) => PAGE_READONLY,
        (false, false, false) => PAGE_NOACCESS,
    }
}

/// Reserves `size` bytes of address space without committing any of it.
///
/// # Errors
///
/// Returns the OS error if the reservation could not be satisfied.
pub fn reserve(size: usize) -> io::Result<NonNull<u8>> {
    // Safety: `VirtualAlloc` with `MEM_RESERVE` and a null base lets the OS pick the address;
    // the returned pointer is only used as an opaque base for later `commit`/`release` calls.
    let base = unsafe { VirtualAlloc(std::ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };
    NonNull::new(base.cast::<u8>()).ok_or_else(io::Error::last_os_error)
}

/// Commits `size` bytes starting at `base` (which must fall within a prior [`reserve`]),
/// applying `flags`' access protection.
///
/// # Errors
///
/// Returns the OS error if the commit could not be satisfied.
///
/// # Safety
///
/// `base` must point into a range previously returned by [`reserve`] and not yet [`release`]d,
/// and `[base, base+size)` must lie within that reservation.
pub unsafe fn commit(base: NonNull<u8>, size: usize, flags: ProtectionFlags) -> io::Result<()> {
    let protect = page_protection(flags);
    // Safety: caller upholds the range precondition.
    let result = unsafe { VirtualAlloc(base.as_ptr().cast(), size, MEM_COMMIT, protect) };
    if result.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Commits a guard page of `size` bytes starting at `base`, faulting the first access instead
/// of silently overrunning into the next reservation.
///
/// # Safety
///
/// Same preconditions as [`commit`].
pub unsafe fn commit_guard_page(base: NonNull<u8>, size: usize) -> io::Result<()> {
    // Safety: caller upholds the range precondition.
    let result =
        unsafe { VirtualAlloc(base.as_ptr().cast(), size, MEM_COMMIT, PAGE_READWRITE | PAGE_GUARD) };
    if result.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Releases an entire reservation previously returned by [`reserve`].
///
/// `size` is accepted for symmetry with the Unix `munmap`-based implementation but is unused
/// here: `VirtualFree(MEM_RELEASE)` always releases the whole reservation and requires a literal
/// size of 0.
///
/// # Safety
///
/// `base` must be the exact base address returned by [`reserve`]; `VirtualFree` with
/// `MEM_RELEASE` requires releasing the whole reservation at once.
#[allow(
    unused_variables,
    reason = "size is part of the public signature for platform symmetry"
)]
pub unsafe fn release(base: NonNull<u8>, size: usize) {
    // Safety: caller upholds the precondition; `size` of 0 is required by `MEM_RELEASE`.
    let ok = unsafe { VirtualFree(base.as_ptr().cast(), 0, MEM_RELEASE) };
    debug_assert_ne!(ok, 0, "VirtualFree(MEM_RELEASE) failed on a reservation we own");
}

/// Flushes the instruction cache over `[base, base+size)` so code written into a committed,
/// executable range is observed by the CPU's instruction fetcher.
///
/// # Safety
///
/// `base` must point at committed memory within a live reservation.
pub unsafe fn flush_icache(base: NonNull<u8>, size: usize) {
    // Safety: caller upholds the precondition.
    unsafe {
        FlushInstructionCache(GetCurrentProcess(), base.as_ptr().cast(), size);
    }
}
