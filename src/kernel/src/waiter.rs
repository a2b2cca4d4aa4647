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

//! A one-shot completion handle for a thread blocking on an async pipeline
//! op, mirroring the teacher's `stream::channel::Channel`: one
//! `Arc<(Mutex<_>, Condvar)>` pair, a single slot, woken exactly once.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct State<T> {
    value: Option<T>,
}

/// A single-use, multi-clone completion cell. One side calls `complete`
/// exactly once; the other blocks in `wait` until it does.
pub struct Waiter<T> {
    core: Arc<(Mutex<State<T>>, Condvar)>,
}

impl<T> Clone for Waiter<T> {
    fn clone(&self) -> Self {
        Waiter {
            core: self.core.clone(),
        }
    }
}

impl<T: Send + 'static> Waiter<T> {
    pub fn new() -> Self {
        Waiter {
            core: Arc::new((Mutex::new(State { value: None }), Condvar::new())),
        }
    }

    /// Fulfills the waiter and wakes the blocked thread, if any. Calling
    /// this more than once overwrites the earlier value; callers are
    /// expected to call it exactly once.
    pub fn complete(&self, value: T) {
        let mut state = self.core.0.lock();
        state.value = Some(value);
        self.core.1.notify_one();
    }

    /// Blocks the calling (OS) thread until `complete` is called.
    pub fn wait(&self) -> T {
        let mut state = self.core.0.lock();
        while state.value.is_none() {
            self.core.1.wait(&mut state);
        }
        state.value.take().expect("checked Some above")
    }
}

impl<T: Send + 'static> Default for Waiter<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_then_wait_returns_value() {
        let w: Waiter<i32> = Waiter::new();
        w.complete(42);
        assert_eq!(w.wait(), 42);
    }

    #[test]
    fn wait_blocks_until_another_thread_completes() {
        let w: Waiter<i32> = Waiter::new();
        let w2 = w.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            w2.complete(7);
        });
        assert_eq!(w.wait(), 7);
        handle.join().unwrap();
    }
}
