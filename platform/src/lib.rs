// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The single surface collaborators (input, the Vulkan loader, WASAPI audio, filesystem walking,
//! the CLI) are meant to depend on, re-exporting the memory, I/O, and scheduler crates (spec.md
//! §6 "External Interfaces").
//!
//! None of those collaborators are implemented here — spec.md scopes them out. This crate only
//! gathers the surface they would sit on top of, plus the `demos` binary exercising it end to
//! end.

pub mod memory {
    pub use arena::{Arena, Error as ArenaError, Marker};
    pub use buddy::{BuddyAllocator, Error as BuddyError};
    pub use mempool::{Error as MemoryError, HostMemoryPool, ProtectionFlags, Reservation};
    pub use util::MemoryRange;
}

pub mod io {
    pub use io_pool::{
        stage_chained, CompletionCallback, CompletionPort, Error as IoError, HintFlags, IoOutcome,
        IoPoolConfig, IoResult, IoThreadPool, Profile, Request, RequestId, RequestPool,
        RequestState, RequestType, DEFAULT_SECTOR_SIZE,
    };
}

pub mod scheduling {
    pub use scheduler::{Error as SchedulerError, Fence, PoolTypeDesc, Scheduler, SchedulerInit, TaskEnv, INFINITE};
    pub use task::{TaskId, TaskMain, UsageFlags};
}
