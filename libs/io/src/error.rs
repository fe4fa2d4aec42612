// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// Errors surfaced by the I/O request pool and thread pool.
///
/// Per-operation OS failures (a failed `open`, a short `read`) are not represented here — they
/// travel through [`crate::IoResult`] to the request's completion callback instead, exactly like
/// spec.md's failure model ("OS errors are passed through in the result; callbacks decide
/// whether to retry").
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O request pool exhausted: no free request slots")]
    RequestPoolExhausted,
    #[error("failed to open the OS completion-notification primitive: {0}")]
    IoOpenFailed(#[source] std::io::Error),
    #[error("worker thread could not read the next completion: {0}")]
    IoReadFailed(#[source] std::io::Error),
    #[error("worker thread could not post a completion event: {0}")]
    IoWriteFailed(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
