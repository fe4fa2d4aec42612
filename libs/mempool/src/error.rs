// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// Errors surfaced by [`crate::HostMemoryPool`].
///
/// Every kind is handed back to the caller on the calling thread; none of them panic. The one
/// exception to that rule lives in [`crate::HostMemoryPool::release`]: releasing a reservation
/// into a pool it wasn't acquired from is a programmer error, not a runtime condition, and aborts
/// via `panic!` rather than returning a value the caller could ignore.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("host memory pool exhausted: no free reservation slots")]
    PoolExhausted,
    #[error("host OS refused the reservation or commit request: {0}")]
    AllocationFailed(#[source] std::io::Error),
    #[error("increase_commit requested past the end of the reservation")]
    OutOfReservation,
}

pub type Result<T> = std::result::Result<T, Error>;
