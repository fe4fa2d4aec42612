// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Page-granular host address-space reservations with lazy commit.
//!
//! [`HostMemoryPool`] owns a fixed number of [`Reservation`] slots and maps every allocation onto
//! the platform's native reserve/commit primitives (`VirtualAlloc` on Windows, `mmap`/`mprotect`
//! on Unix), so higher-level allocators (an arena, a buddy allocator) can build on a single
//! virtual-memory abstraction regardless of host OS.

mod error;
mod flags;
mod pool;
mod reservation;
mod sys;

pub use error::{Error, Result};
pub use flags::ProtectionFlags;
pub use pool::HostMemoryPool;
pub use reservation::Reservation;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_round_trip() {
        let mut pool = HostMemoryPool::create(4, 4096, 4096, "test-pool");
        let page = pool.page_size();

        let reservation = pool
            .acquire(page, page, ProtectionFlags::default())
            .expect("acquire should succeed");
        assert_eq!(reservation.bytes_reserved(), page);
        assert_eq!(reservation.bytes_committed(), page);

        // Safety: the reservation is fully committed and exclusively borrowed here.
        let slice = unsafe { reservation.as_slice() };
        assert_eq!(slice.len(), page);

        pool.release(reservation);
    }

    #[test]
    fn reserve_rounds_up_to_min_alloc_size() {
        let mut pool = HostMemoryPool::create(1, 64 * 1024, 4096, "test-pool");
        let reservation = pool
            .acquire(16, 0, ProtectionFlags::default())
            .expect("acquire should succeed");
        assert_eq!(reservation.bytes_reserved(), 64 * 1024);
        assert_eq!(reservation.bytes_committed(), 0);
        pool.release(reservation);
    }

    #[test]
    fn execute_flag_forces_full_commit() {
        let mut pool = HostMemoryPool::create(1, 4096, 4096, "test-pool");
        let page = pool.page_size();
        let reservation = pool
            .acquire(4 * page, 0, ProtectionFlags::READ | ProtectionFlags::EXECUTE)
            .expect("acquire should succeed");
        assert_eq!(reservation.bytes_committed(), reservation.bytes_reserved());
        pool.release(reservation);
    }

    #[test]
    fn increase_commit_grows_monotonically() {
        let mut pool = HostMemoryPool::create(1, 4096, 4096, "test-pool");
        let page = pool.page_size();
        let mut reservation = pool
            .acquire(8 * page, page, ProtectionFlags::default())
            .expect("acquire should succeed");
        assert_eq!(reservation.bytes_committed(), page);

        pool.increase_commit(&mut reservation, 2 * page)
            .expect("growing commit should succeed");
        assert!(reservation.bytes_committed() >= 2 * page);

        let committed_before = reservation.bytes_committed();
        pool.increase_commit(&mut reservation, page)
            .expect("requesting a smaller commit than current is a no-op, not a shrink");
        assert_eq!(reservation.bytes_committed(), committed_before);

        pool.release(reservation);
    }

    #[test]
    fn increase_commit_past_reservation_fails() {
        let pool = HostMemoryPool::create(1, 4096, 4096, "test-pool");
        let page = pool.page_size();
        let mut pool = pool;
        let mut reservation = pool
            .acquire(page, page, ProtectionFlags::default())
            .expect("acquire should succeed");
        assert_eq!(reservation.bytes_committed(), reservation.bytes_reserved());

        let err = pool
            .increase_commit(&mut reservation, 2 * page)
            .expect_err("reservation is already fully committed");
        assert!(matches!(err, Error::OutOfReservation));

        pool.release(reservation);
    }

    #[test]
    fn guard_page_does_not_count_toward_reserved_bytes() {
        let mut pool = HostMemoryPool::create(1, 4096, 4096, "test-pool");
        let page = pool.page_size();
        let reservation = pool
            .acquire(
                page,
                page,
                ProtectionFlags::default() | ProtectionFlags::GUARD_PAGE,
            )
            .expect("acquire should succeed");
        assert!(reservation.has_guard_page());
        assert_eq!(reservation.bytes_reserved(), page);
        pool.release(reservation);
    }

    #[test]
    fn pool_exhaustion_surfaces_as_error() {
        let mut pool = HostMemoryPool::create(1, 4096, 4096, "test-pool");
        let page = pool.page_size();
        let first = pool
            .acquire(page, page, ProtectionFlags::default())
            .expect("first acquire should succeed");

        let err = pool
            .acquire(page, page, ProtectionFlags::default())
            .expect_err("pool has no remaining slots");
        assert!(matches!(err, Error::PoolExhausted));

        pool.release(first);
        pool.acquire(page, page, ProtectionFlags::default())
            .expect("slot was freed by the prior release");
    }

    #[test]
    #[should_panic(expected = "double-release")]
    fn releasing_into_the_wrong_pool_panics() {
        let mut pool_a = HostMemoryPool::create(1, 4096, 4096, "pool-a");
        let mut pool_b = HostMemoryPool::create(1, 4096, 4096, "pool-b");
        let page = pool_a.page_size();

        let reservation = pool_a
            .acquire(page, page, ProtectionFlags::default())
            .expect("acquire should succeed");
        pool_b.release(reservation);
    }
}
