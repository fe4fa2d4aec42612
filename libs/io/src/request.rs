// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use bitflags::bitflags;
use std::path::PathBuf;
use std::ptr::NonNull;
use std::time::{Duration, Instant};

/// Identifies a slot inside a [`crate::RequestPool`] (spec.md §3's "op handle").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub(crate) u32);

/// Operation kind for an [`Request`] (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    Noop,
    Open,
    Read,
    Write,
    Flush,
    Close,
}

/// Lifecycle state of an [`Request`] (spec.md §3, §4.E).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Chained,
    Submitted,
    Launched,
    Completed,
}

bitflags! {
    /// Hints controlling how `OPEN` maps onto OS access/share/create flags (spec.md §4.E).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HintFlags: u16 {
        const CREATE                  = 1 << 0;
        const TRUNCATE                = 1 << 1;
        const READ_ONLY               = 1 << 2;
        const WRITE_ONLY              = 1 << 3;
        const SEQUENTIAL_SCAN         = 1 << 4;
        const NO_BUFFERING            = 1 << 5;
        const SKIP_SYNC_NOTIFICATION  = 1 << 6;
        const PREALLOCATE             = 1 << 7;
    }
}

/// The outcome of a completed operation, handed to the completion callback alongside a
/// [`Profile`].
#[derive(Debug, Default, Clone, Copy)]
pub struct IoOutcome {
    pub bytes_transferred: usize,
    /// Populated by `OPEN`: the file's current size.
    pub file_size: u64,
    /// Populated by `OPEN`: the hard-coded physical sector size hint (spec.md §9 Open Question).
    pub sector_size: u32,
    pub eof: bool,
}

pub type IoResult = std::result::Result<IoOutcome, std::io::Error>;

/// Queue delay, execution time, and worker identity handed to a completion callback (spec.md
/// §4.E).
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub queue_delay: Duration,
    pub execution_time: Duration,
    pub os_thread_id: std::thread::ThreadId,
}

/// Runs once a request reaches `COMPLETED`. Returns an optional chained request to execute
/// immediately on the same worker, bypassing resubmission through the completion port (spec.md
/// §9 "I/O chaining").
pub type CompletionCallback = Box<dyn FnOnce(IoResult, Profile) -> Option<RequestId> + Send>;

/// A single I/O operation plus its bookkeeping (spec.md §3).
pub struct Request {
    pub state: RequestState,
    pub kind: RequestType,
    pub path: Option<PathBuf>,
    pub file: Option<std::fs::File>,
    /// Borrowed data buffer for `READ`/`WRITE`. The caller must keep the pointed-to memory alive
    /// and exclusively borrowed until the completion callback runs.
    ///
    /// # Safety
    ///
    /// Set only via [`Request::set_buffer`], which documents the aliasing contract.
    pub(crate) data_buffer: Option<NonNull<u8>>,
    pub(crate) data_len: usize,
    /// For `READ`/`WRITE`: the absolute offset's fixed component (added to `file_offset`). For
    /// `OPEN` with `HintFlags::PREALLOCATE`: the size to preallocate to.
    pub base_offset: u64,
    pub file_offset: u64,
    pub hint_flags: HintFlags,
    pub user_context: u64,
    pub completion_callback: Option<CompletionCallback>,
    pub submit_ts: Option<Instant>,
    pub launch_ts: Option<Instant>,
    pub finish_ts: Option<Instant>,
}

// Safety: `Request` only ever crosses threads while owned by exactly one worker at a time
// (extracted from the pool, handed to a worker, returned); the raw `data_buffer` pointer's
// aliasing contract is documented on `set_buffer`.
unsafe impl Send for Request {}

impl Default for Request {
    fn default() -> Self {
        Self {
            state: RequestState::Chained,
            kind: RequestType::Noop,
            path: None,
            file: None,
            data_buffer: None,
            data_len: 0,
            base_offset: 0,
            file_offset: 0,
            hint_flags: HintFlags::empty(),
            user_context: 0,
            completion_callback: None,
            submit_ts: None,
            launch_ts: None,
            finish_ts: None,
        }
    }
}

impl Request {
    /// Points the request at a caller-owned data buffer for `READ`/`WRITE`.
    ///
    /// # Safety
    ///
    /// `buffer` must remain valid and exclusively accessible to this request until its
    /// completion callback has run.
    pub unsafe fn set_buffer(&mut self, buffer: NonNull<u8>, len: usize) {
        self.data_buffer = Some(buffer);
        self.data_len = len;
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.data_len
    }
}
