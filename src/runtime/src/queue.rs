// Copyright 2022 The template Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A bounded FIFO admission queue. Generalizes the teacher's
//! `stream::channel::Channel` (one `Mutex` + one `Condvar`, draining with a
//! blocking `take()`) to a second condition variable so that *admission*
//! (callers waiting for capacity) and *draining* (workers waiting for work)
//! each get their own wakeup instead of sharing one and over-waking.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    in_flight: usize,
    max_inflight: usize,
    closed: bool,
}

/// A queue of pending operations bounded by `max_inflight`: `push` blocks
/// the calling thread while `in_flight >= max_inflight`. A worker calls
/// `pop` to dequeue the next item (blocking until one is available or the
/// queue is closed), does its work, then calls `complete_one` to release an
/// admission slot.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(max_inflight: usize) -> Self {
        assert!(max_inflight > 0, "max_inflight must be positive");
        BoundedQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                in_flight: 0,
                max_inflight,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Blocks the calling (OS) thread until an admission slot is free, then
    /// enqueues `item`. Returns `false` without enqueuing if the queue has
    /// been closed in the meantime.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        while inner.in_flight >= inner.max_inflight && !inner.closed {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return false;
        }
        inner.in_flight += 1;
        inner.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Blocks until an item is available or the queue is closed and
    /// drained, in which case it returns `None`.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Releases one admission slot, waking a blocked `push` caller if any.
    pub fn complete_one(&self) {
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        self.not_full.notify_one();
    }

    /// Marks the queue closed: blocked and future `push`/`pop` calls
    /// unblock immediately (`push` returns `false`, `pop` drains remaining
    /// items then returns `None`).
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn push_then_pop_round_trips() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        assert!(q.push(1));
        assert_eq!(q.pop(), Some(1));
    }

    #[test]
    fn push_blocks_past_capacity_until_complete_one() {
        let q = Arc::new(BoundedQueue::new(1));
        assert!(q.push(1));

        let q2 = q.clone();
        let handle = std::thread::spawn(move || {
            // this would block forever without a complete_one() from the
            // main thread
            q2.push(2)
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        q.complete_one();
        assert!(handle.join().unwrap());
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn close_drains_then_returns_none() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        q.push(1);
        q.close();
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), None);
        assert!(!q.push(2));
    }
}
