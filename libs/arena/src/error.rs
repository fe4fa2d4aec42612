// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// Errors surfaced by [`crate::Arena`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("arena exhausted: requested allocation does not fit in the remaining space")]
    ArenaExhausted,
}

pub type Result<T> = std::result::Result<T, Error>;
