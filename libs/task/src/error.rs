// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task pool exhausted: no free slots")]
    TaskLimit,
    #[error("argument data exceeds the inline {max} byte budget ({requested} bytes requested)")]
    DataLimit { requested: usize, max: usize },
    #[error("a dependency's permit list is full (at most {max} permits per task)")]
    PermitLimit { max: usize },
    #[error("task definition attempted from a thread that does not own this pool")]
    InvalidThread,
    #[error("parent task id does not address a live task in this pool")]
    InvalidParent,
}

pub type Result<T> = std::result::Result<T, Error>;
