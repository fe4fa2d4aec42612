// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::IO::{
    CreateIoCompletionPort, GetQueuedCompletionStatus, OVERLAPPED, PostQueuedCompletionStatus,
};

/// Wraps a Windows I/O completion port.
pub struct CompletionPort {
    handle: HANDLE,
}

// Safety: an IOCP handle is explicitly documented by Microsoft as safe to share and call
// concurrently from multiple threads.
unsafe impl Send for CompletionPort {}
unsafe impl Sync for CompletionPort {}

impl CompletionPort {
    pub fn create() -> io::Result<Self> {
        // Safety: passing `INVALID_HANDLE_VALUE` with a zero existing-port handle creates a new,
        // unassociated completion port; `max_threads` of 0 lets the OS pick a default.
        let handle = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, 0, 0, 0) };
        if handle == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle })
    }

    #[must_use]
    pub fn raw_handle(&self) -> HANDLE {
        self.handle
    }

    /// Posts a completion event carrying `key` with no associated overlapped structure, used
    /// both to wake a worker for a freshly submitted request and to deliver the shutdown
    /// sentinel.
    pub fn post(&self, key: usize) -> io::Result<()> {
        // Safety: `self.handle` is a live completion port for the lifetime of `self`.
        let ok = unsafe {
            PostQueuedCompletionStatus(self.handle, 0, key, std::ptr::null_mut::<OVERLAPPED>())
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks until a completion event is available and returns its key.
    pub fn wait(&self) -> io::Result<usize> {
        let mut bytes = 0u32;
        let mut key = 0usize;
        let mut overlapped: *mut OVERLAPPED = std::ptr::null_mut();
        // Safety: `self.handle` is a live completion port; the output parameters are only
        // written to by the OS.
        let ok = unsafe {
            GetQueuedCompletionStatus(
                self.handle,
                &mut bytes,
                &mut key,
                &mut overlapped,
                u32::MAX,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(key)
    }
}

impl Drop for CompletionPort {
    fn drop(&mut self) {
        // Safety: `self.handle` is owned by this `CompletionPort` and not used after this call.
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
