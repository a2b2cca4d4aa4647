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

//! A fixed-size pool of OS-level worker threads, each draining a shared
//! [`BoundedQueue`] and running its handler to completion as a synchronous
//! retry loop against an async backend: every thread owns a dedicated
//! current-thread Tokio runtime and `block_on`s the async handler, rather
//! than sharing a multi-threaded runtime with the rest of the process. This
//! mirrors the finisher-thread-pool role the reference implementation this
//! crate's caller is modeled on assigns its own worker threads, while
//! keeping the handler itself written against `async fn` backends.

use std::{future::Future, sync::Arc, thread::JoinHandle};

use tracing::debug;

use crate::queue::BoundedQueue;

/// A running pool of finisher threads. Dropping this does not stop the
/// threads; call [`WorkerPool::shutdown`] (which also closes the queue) to
/// join them.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `count` OS threads named `{name_prefix}-{n}`, each looping
    /// `queue.pop()` → `handler(item)` → `queue.complete_one()` until the
    /// queue is closed and drained.
    pub fn start<T, F, Fut>(count: usize, name_prefix: &str, queue: Arc<BoundedQueue<T>>, handler: F) -> Self
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        let handles = (0..count)
            .map(|idx| {
                let queue = queue.clone();
                let handler = handler.clone();
                std::thread::Builder::new()
                    .name(format!("{name_prefix}-{idx}"))
                    .spawn(move || {
                        let rt = tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                            .expect("failed to build finisher-thread runtime");
                        loop {
                            match queue.pop() {
                                Some(item) => {
                                    rt.block_on(handler(item));
                                    queue.complete_one();
                                }
                                None => {
                                    debug!(thread = idx, "finisher thread draining, queue closed");
                                    break;
                                }
                            }
                        }
                    })
                    .expect("failed to spawn finisher thread")
            })
            .collect();
        WorkerPool { handles }
    }

    /// Closes `queue` (unblocking any threads parked in `pop`) and joins
    /// every worker thread.
    pub fn shutdown<T>(self, queue: &BoundedQueue<T>) {
        queue.close();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
