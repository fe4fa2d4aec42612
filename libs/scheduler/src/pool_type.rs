// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use task::UsageFlags;

/// Describes one class of task pool a [`crate::Scheduler`] is constructed with (spec.md §4.H).
///
/// Exactly one descriptor in a [`crate::SchedulerInit`] may set [`UsageFlags::WORKER`]; the
/// scheduler spawns one worker thread per pool of that type and binds it to that pool for the
/// worker's entire lifetime.
#[derive(Clone, Debug)]
pub struct PoolTypeDesc {
    /// How many pools of this type to create.
    pub pool_count: usize,
    /// Task slot capacity per pool. Must be a power of two.
    pub task_capacity: usize,
    /// Byte size of each pool's local scratch arena, reset before every task it runs.
    pub local_arena_size: usize,
    /// Capacity of the `io-pool` request pool each pool of this type is given.
    pub io_request_pool_size: usize,
    pub usage: UsageFlags,
}
