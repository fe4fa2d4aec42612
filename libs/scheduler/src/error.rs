// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("exactly one pool type must set UsageFlags::WORKER, found {found}")]
    WorkerPoolTypeCount { found: usize },
    #[error("pool type {index} requested {requested} pools, exceeding the scheduler's addressable pool space")]
    TooManyPools { index: usize, requested: usize },
    #[error("no free task pool available for pool type {type_id}")]
    PoolTypeExhausted { type_id: usize },
    #[error(transparent)]
    Task(#[from] task::Error),
    #[error(transparent)]
    Memory(#[from] mempool::Error),
    #[error(transparent)]
    Arena(#[from] arena::Error),
    #[error(transparent)]
    Io(#[from] io_pool::Error),
    #[error("task id does not address a live task known to this scheduler")]
    InvalidTask,
}

pub type Result<T> = std::result::Result<T, Error>;
