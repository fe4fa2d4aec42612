// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::request::{Request, RequestId, RequestState};
use parking_lot::Mutex;

struct Inner {
    storage: Vec<Option<Request>>,
    free: Vec<u32>,
    live_count: usize,
}

/// A fixed-capacity pool of [`Request`] records (spec.md §4.D).
///
/// The source models this as a free list and a live list both threaded through the request
/// records themselves. Here a request is instead *extracted by value* out of the pool's storage
/// on [`Self::allocate`] and handed back on [`Self::return_request`] — the same free/live
/// accounting and single critical section, but ownership-based instead of pointer-based, so two
/// threads can never observe or mutate the same request concurrently by construction.
pub struct RequestPool {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl std::fmt::Debug for RequestPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPool")
            .field("capacity", &self.capacity)
            .field("live_count", &self.live_count())
            .finish_non_exhaustive()
    }
}

impl RequestPool {
    #[must_use]
    pub fn create(capacity: usize) -> Self {
        let storage = (0..capacity).map(|_| Some(Request::default())).collect();
        let free = (0..capacity)
            .rev()
            .map(|i| u32::try_from(i).expect("pool capacity fits in u32"))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                storage,
                free,
                live_count: 0,
            }),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pops a request off the free list and initializes its state to `CHAINED`.
    ///
    /// Returns `None` on exhaustion, matching spec.md's `NULL` return.
    pub fn allocate(&self) -> Option<(RequestId, Request)> {
        let mut inner = self.inner.lock();
        let idx = inner.free.pop().or_else(|| {
            tracing::trace!(capacity = self.capacity, "request pool exhausted");
            None
        })?;
        inner.live_count += 1;
        let mut request = inner.storage[idx as usize]
            .take()
            .expect("a slot on the free list always holds a parked request");
        request.state = RequestState::Chained;
        Some((RequestId(idx), request))
    }

    /// Returns `request` to the pool under `id`, making the slot available to the next
    /// [`Self::allocate`] call.
    pub fn return_request(&self, id: RequestId, request: Request) {
        let mut inner = self.inner.lock();
        inner.storage[id.0 as usize] = Some(request);
        inner.live_count -= 1;
        inner.free.push(id.0);
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.lock().live_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_return_round_trips() {
        let pool = RequestPool::create(2);
        let (id, req) = pool.allocate().expect("pool has free slots");
        assert_eq!(req.state, RequestState::Chained);
        assert_eq!(pool.live_count(), 1);
        pool.return_request(id, req);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn exhaustion_returns_none() {
        let pool = RequestPool::create(1);
        let (id, req) = pool.allocate().expect("first allocate should succeed");
        assert!(pool.allocate().is_none());
        pool.return_request(id, req);
        assert!(pool.allocate().is_some());
    }
}
