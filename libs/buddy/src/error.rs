// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// Errors surfaced by [`crate::BuddyAllocator`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("requested block ({requested} bytes) exceeds the allocator's max block size ({max} bytes)")]
    TooLarge { requested: usize, max: usize },
    #[error("min and max block sizes must be powers of two with max > min")]
    InvalidBounds,
    #[error("levels count {levels} exceeds the supported maximum of 16")]
    TooManyLevels { levels: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
