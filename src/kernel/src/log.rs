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

//! The caller-facing facade: [`Log`] composes a [`journal::ViewManager`], a
//! [`Striper`], and a [`Pipeline`] over a single [`storage::Backend`]
//! instance, the way the teacher's `local::Kernel` composes its journal and
//! storage abstractions behind one constructor.

use std::sync::Arc;

use journal::{StripeMapping, View, ViewManager};
use storage::Backend;
use tracing::info;

use crate::{
    error::{Error, Result},
    options::Options,
    pipeline::{OpKind, OpResult, Pipeline},
    striper::Striper,
};

pub struct Log {
    pipeline: Pipeline,
}

impl Log {
    /// Opens `name` against `backend` if it already exists, otherwise
    /// creates it with a single genesis stripe sized from `opts`.
    pub async fn create_or_open(backend: Arc<dyn Backend>, name: &str, opts: Options) -> Result<Self> {
        let manager = match ViewManager::open(backend.clone(), name).await {
            Ok(manager) => manager,
            Err(journal::Error::Storage(storage::Error::NotFound { .. })) => {
                let genesis = View {
                    epoch: 1,
                    stripes: vec![StripeMapping {
                        start_pos: 0,
                        end_pos: opts.entries_per_stripe_object.saturating_sub(1),
                        prefix: format!("{name}.stripe"),
                        width: opts.stripe_width,
                    }],
                    sequencer: None,
                };
                info!(log = name, "creating new log");
                ViewManager::create(backend.clone(), name, genesis).await?
            }
            Err(e) => return Err(e.into()),
        };

        let node_id = manager.unique_id().await?;
        let striper = Arc::new(Striper::new(manager, node_id, opts.stripe_width, opts.entries_per_stripe_object).await?);
        let pipeline = Pipeline::start(striper, backend, opts.finisher_threads, opts.max_inflight_ops);
        Ok(Log { pipeline })
    }

    async fn submit(&self, kind: OpKind) -> Result<OpResult> {
        match self.pipeline.submit_async(kind).await {
            Ok(result) => result,
            Err(_) => Err(Error::Shutdown),
        }
    }

    /// Appends `data`, blocking asynchronously until a position is
    /// assigned and durably recorded.
    pub async fn append(&self, data: Vec<u8>) -> Result<u64> {
        match self.submit(OpKind::Append(data)).await? {
            OpResult::Position(p) => Ok(p),
            _ => unreachable!("Append always yields a Position"),
        }
    }

    /// Fire-and-forget variant of [`Log::append`]: `cb` runs exactly once,
    /// on a background task, once the position is known (or the pipeline
    /// has shut down).
    pub fn append_async<F>(&self, data: Vec<u8>, cb: F)
    where
        F: FnOnce(Result<u64>) + Send + 'static,
    {
        let rx = self.pipeline.submit_async(OpKind::Append(data));
        tokio::spawn(async move {
            let result = match rx.await {
                Ok(Ok(OpResult::Position(p))) => Ok(p),
                Ok(Ok(_)) => unreachable!("Append always yields a Position"),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(Error::Shutdown),
            };
            cb(result);
        });
    }

    pub async fn read(&self, position: u64) -> Result<Vec<u8>> {
        match self.submit(OpKind::Read(position)).await? {
            OpResult::Data(d) => Ok(d),
            _ => unreachable!("Read always yields Data"),
        }
    }

    pub async fn fill(&self, position: u64) -> Result<()> {
        match self.submit(OpKind::Fill(position)).await? {
            OpResult::Unit => Ok(()),
            _ => unreachable!("Fill always yields Unit"),
        }
    }

    pub async fn trim(&self, position: u64) -> Result<()> {
        match self.submit(OpKind::Trim(position)).await? {
            OpResult::Unit => Ok(()),
            _ => unreachable!("Trim always yields Unit"),
        }
    }

    /// Returns the next position the sequencer would assign.
    /// `increment = false` peeks without consuming it.
    pub async fn check_tail(&self, increment: bool) -> Result<u64> {
        match self.submit(OpKind::Tail { increment }).await? {
            OpResult::Position(p) => Ok(p),
            _ => unreachable!("Tail always yields a Position"),
        }
    }

    /// Consumes the log, completing any still-queued operations with
    /// `Error::Shutdown` and joining the finisher thread pool.
    pub fn shutdown(self) {
        self.pipeline.shutdown();
    }
}
