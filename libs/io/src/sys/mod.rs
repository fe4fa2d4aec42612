// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A single OS completion-notification primitive shared by every worker thread (spec.md §4.E).
//!
//! [`CompletionPort::post`] enqueues a completion key; [`CompletionPort::wait`] blocks until one
//! is available. [`crate::thread_pool`] never touches a raw OS handle directly.

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        mod windows;
        pub use windows::CompletionPort;
    } else if #[cfg(unix)] {
        mod unix;
        pub use unix::CompletionPort;
    } else {
        compile_error!("io-pool requires either `windows` or `unix`");
    }
}
