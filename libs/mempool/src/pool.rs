// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{Error, Result};
use crate::flags::ProtectionFlags;
use crate::reservation::Reservation;
use crate::sys;
use std::sync::atomic::{AtomicU64, Ordering};

fn round_up(value: usize, multiple: usize) -> usize {
    debug_assert!(multiple.is_power_of_two());
    (value + multiple - 1) & !(multiple - 1)
}

enum Slot {
    Free { next: Option<u32> },
    Used,
}

/// A fixed array of reservation records with a singly-linked free list (spec.md §3, §4.A).
///
/// Not thread-safe by design (spec.md §5): callers are expected to own a pool, the same way a
/// task pool is owned by the thread that allocated it.
#[derive(Debug)]
pub struct HostMemoryPool {
    name: String,
    id: u64,
    page_size: usize,
    allocation_granularity: usize,
    min_alloc_size: usize,
    min_commit_increase: usize,
    slots: Box<[std::cell::UnsafeCell<Slot>]>,
    free_head: Option<u32>,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Free { next } => f.debug_struct("Free").field("next", next).finish(),
            Slot::Used => f.write_str("Used"),
        }
    }
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

impl HostMemoryPool {
    /// Creates a pool with room for `capacity` simultaneously live reservations.
    ///
    /// `min_alloc_size` is the smallest reservation `acquire` will ever make (smaller requests
    /// are rounded up); `min_commit_increase` is the minimum step [`Self::increase_commit`]
    /// grows a reservation's committed prefix by.
    #[must_use]
    pub fn create(
        capacity: usize,
        min_alloc_size: usize,
        min_commit_increase: usize,
        name: impl Into<String>,
    ) -> Self {
        let slots = (0..capacity)
            .map(|i| {
                let next = if i + 1 < capacity {
                    Some(u32::try_from(i + 1).expect("pool capacity fits in u32"))
                } else {
                    None
                };
                std::cell::UnsafeCell::new(Slot::Free { next })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            name: name.into(),
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            page_size: sys::page_size(),
            allocation_granularity: sys::allocation_granularity(),
            min_alloc_size,
            min_commit_increase,
            slots,
            free_head: if capacity == 0 { None } else { Some(0) },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn slot_mut(&mut self, index: u32) -> &mut Slot {
        // Safety: `&mut self` guarantees exclusive access to the whole pool, including every
        // cell; `UnsafeCell` is only used here to let `Slot::Used` entries coexist with the
        // `Reservation` handles callers hold without borrowing them through `self`.
        unsafe { &mut *self.slots[index as usize].get() }
    }

    /// Reserves `reserve` bytes (rounded up to a page multiple) of address space and commits
    /// `commit` bytes (also page-rounded) of it.
    ///
    /// `flags` selects the union of read/write/execute access and whether a trailing guard page
    /// is appended. `ProtectionFlags::EXECUTE` forces the entire reservation to be committed
    /// immediately regardless of the requested `commit` (spec.md §4.A).
    ///
    /// # Errors
    ///
    /// [`Error::PoolExhausted`] if every slot is in use; [`Error::AllocationFailed`] if the OS
    /// refuses the reservation or commit.
    pub fn acquire(
        &mut self,
        reserve: usize,
        commit: usize,
        flags: ProtectionFlags,
    ) -> Result<Reservation> {
        let slot_index = self.free_head.ok_or(Error::PoolExhausted)?;

        let page_size = self.page_size;
        let bytes_reserved = round_up(reserve.max(self.min_alloc_size), page_size);
        let mut bytes_committed = round_up(commit, page_size).min(bytes_reserved);
        if flags.contains(ProtectionFlags::EXECUTE) {
            bytes_committed = bytes_reserved;
        }

        let has_guard_page = flags.contains(ProtectionFlags::GUARD_PAGE);
        let mapped_len = bytes_reserved + if has_guard_page { page_size } else { 0 };

        let base = sys::reserve(mapped_len).map_err(Error::AllocationFailed)?;

        if bytes_committed > 0 {
            // Safety: `base` was just reserved by `sys::reserve` above and `bytes_committed`
            // is bounded by `bytes_reserved <= mapped_len`.
            let commit_result = unsafe { sys::commit(base, bytes_committed, flags) };
            if let Err(err) = commit_result {
                // Safety: `base`/`mapped_len` exactly match the just-created reservation.
                unsafe { sys::release(base, mapped_len) };
                return Err(Error::AllocationFailed(err));
            }
        }

        if has_guard_page {
            // Safety: the guard page lies at `[bytes_reserved, bytes_reserved + page_size)`,
            // which is within `mapped_len` and was not committed above.
            let guard_base =
                unsafe { std::ptr::NonNull::new_unchecked(base.as_ptr().add(bytes_reserved)) };
            let guard_result = unsafe { sys::commit_guard_page(guard_base, page_size) };
            if let Err(err) = guard_result {
                // Safety: see above.
                unsafe { sys::release(base, mapped_len) };
                return Err(Error::AllocationFailed(err));
            }
        }

        // Mark the slot used and advance the free list before handing out the reservation, so a
        // failure path above never leaves the free list pointing at a half-initialized slot.
        let next_free = match self.slot_mut(slot_index) {
            Slot::Free { next } => *next,
            Slot::Used => unreachable!("free_head pointed at a used slot"),
        };
        *self.slot_mut(slot_index) = Slot::Used;
        self.free_head = next_free;

        tracing::trace!(
            pool = %self.name,
            slot = slot_index,
            bytes_reserved,
            bytes_committed,
            has_guard_page,
            "acquired reservation"
        );

        Ok(Reservation {
            base,
            mapped_len,
            bytes_reserved,
            bytes_committed,
            flags,
            has_guard_page,
            pool_id: self.id,
            slot: slot_index,
        })
    }

    /// Releases a reservation back to this pool.
    ///
    /// # Panics
    ///
    /// Panics if `reservation` was not acquired from this pool. This is a contract violation
    /// (spec.md §4.A: "detectable via the back-pointer on the reservation record"), not a
    /// recoverable runtime error — every other `HostMemoryPool` method is infallible with
    /// respect to ownership because callers are expected to track which pool they acquired from.
    pub fn release(&mut self, reservation: Reservation) {
        assert_eq!(
            reservation.pool_id, self.id,
            "double-release: reservation was acquired from a different HostMemoryPool (pool {}, reservation tagged {})",
            self.id, reservation.pool_id
        );

        // Safety: `base`/`mapped_len` were produced together by `acquire` and are released
        // exactly once, here.
        unsafe { sys::release(reservation.base, reservation.mapped_len) };

        let slot = reservation.slot;
        *self.slot_mut(slot) = Slot::Free {
            next: self.free_head,
        };
        self.free_head = Some(slot);

        tracing::trace!(pool = %self.name, slot, "released reservation");
    }

    /// Raises `reservation`'s committed prefix to at least `new_commit` bytes, growing by at
    /// least `min_commit_increase` each call and never shrinking (spec.md §4.A).
    ///
    /// # Errors
    ///
    /// [`Error::OutOfReservation`] if `reservation` is already fully committed;
    /// [`Error::AllocationFailed`] if the OS refuses the additional commit.
    pub fn increase_commit(&self, reservation: &mut Reservation, new_commit: usize) -> Result<()> {
        if reservation.bytes_committed >= reservation.bytes_reserved {
            return Err(Error::OutOfReservation);
        }

        let target = round_up(new_commit, self.page_size)
            .max(reservation.bytes_committed + self.min_commit_increase)
            .min(reservation.bytes_reserved);

        if target <= reservation.bytes_committed {
            return Ok(());
        }

        let grow_base = reservation.base.as_ptr().wrapping_add(reservation.bytes_committed);
        let grow_len = target - reservation.bytes_committed;
        // Safety: `grow_base..grow_base+grow_len` is the uncommitted tail of `reservation`,
        // which is within `bytes_reserved <= mapped_len`.
        let result = unsafe {
            sys::commit(
                std::ptr::NonNull::new_unchecked(grow_base),
                grow_len,
                reservation.flags,
            )
        };
        result.map_err(Error::AllocationFailed)?;

        reservation.bytes_committed = target;
        Ok(())
    }

    /// Flushes the instruction cache over `reservation`'s committed range.
    ///
    /// Only meaningful for reservations with [`ProtectionFlags::EXECUTE`]: code written into an
    /// executable page must be flushed before it is safe to jump into.
    pub fn flush_instruction_cache(&self, reservation: &Reservation) {
        // Safety: `base` is committed for `bytes_committed` bytes for as long as `reservation`
        // is alive, which it is here by borrow.
        unsafe { sys::flush_icache(reservation.base, reservation.bytes_committed) };
    }

    /// Resets the pool to its just-created state, rebuilding the free list from scratch.
    ///
    /// Every slot is marked free regardless of its current state. Callers must have already
    /// released (or otherwise given up) every [`Reservation`] still referencing this pool, since
    /// this does not unmap anything itself — it only forgets the pool's bookkeeping.
    ///
    /// # Safety
    ///
    /// The caller must guarantee no [`Reservation`] acquired from this pool is still
    /// dereferenced after this call, and that any still-live reservations have been released
    /// through [`Self::release`] (or otherwise unmapped) beforehand, since this does not unmap
    /// their memory on its own.
    pub unsafe fn reset(&mut self) {
        let len = self.slots.len();
        for index in (0..len).rev() {
            let next = if index + 1 < len {
                Some(u32::try_from(index + 1).expect("pool capacity fits in u32"))
            } else {
                None
            };
            *self.slot_mut(u32::try_from(index).expect("pool capacity fits in u32")) =
                Slot::Free { next };
        }
        self.free_head = if len == 0 { None } else { Some(0) };
    }
}
