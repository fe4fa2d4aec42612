// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Power-of-two block allocator with explicit split/merge bit indexes instead of an intrusive
//! free list, so it can manage address ranges that are not directly addressable.

mod bitset;
mod buddy;
mod error;

pub use buddy::BuddyAllocator;
pub use error::{Error, Result};
