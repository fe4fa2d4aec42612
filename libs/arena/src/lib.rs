// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bump-pointer sub-allocation over a fixed-size byte range.
//!
//! [`Arena`] hands out monotonically increasing, aligned offsets and supports rewinding to a
//! prior [`Marker`], but never frees an individual allocation — callers needing reclamation at
//! finer granularity want the `buddy` crate instead.

mod arena;
mod error;

pub use arena::{Arena, Marker};
pub use error::{Error, Result};
