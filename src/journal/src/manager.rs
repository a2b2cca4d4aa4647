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

//! The head object / view manager: a thin, backend-agnostic wrapper around
//! [`storage::Backend`]'s head-object operations that speaks in decoded
//! [`View`]s instead of opaque bytes. This is deliberately a dumb layer —
//! no local caching, no retries — so that the caching and retry policy
//! (the striper, in the `kernel` crate) has a single well-defined primitive
//! to build on.

use std::{collections::BTreeMap, sync::Arc};

use storage::Backend;
use tracing::info;

use crate::{
    view::{self, View},
    Result,
};

/// Owns the identity of one log's head object and forwards view-chain
/// operations to the backend, encoding/decoding [`View`] payloads.
pub struct ViewManager {
    backend: Arc<dyn Backend>,
    head_oid: String,
    pub prefix: String,
}

impl ViewManager {
    fn new(backend: Arc<dyn Backend>, head_oid: String, prefix: String) -> Self {
        ViewManager {
            backend,
            head_oid,
            prefix,
        }
    }

    /// Creates a brand-new log named `name`, publishing `initial_view` as
    /// epoch 1. Fails with `storage::Error::Exists` if the name is taken.
    pub async fn create(backend: Arc<dyn Backend>, name: &str, initial_view: View) -> Result<Self> {
        let payload = view::encode(&initial_view)?;
        let (head_oid, prefix) = backend.create_log(name, payload).await?;
        info!(log = name, epoch = initial_view.epoch, "log created");
        Ok(Self::new(backend, head_oid, prefix))
    }

    /// Opens an existing log by name, resolving its head object via the
    /// link object.
    pub async fn open(backend: Arc<dyn Backend>, name: &str) -> Result<Self> {
        let (head_oid, prefix) = backend.open_log(name).await?;
        Ok(Self::new(backend, head_oid, prefix))
    }

    pub fn head_oid(&self) -> &str {
        &self.head_oid
    }

    /// Returns up to `max` consecutive views starting at `start_epoch`, in
    /// epoch order, with no gaps.
    pub async fn read_views(&self, start_epoch: u64, max: u32) -> Result<BTreeMap<u64, View>> {
        let raw = self.backend.read_views(&self.head_oid, start_epoch, max).await?;
        let mut views = BTreeMap::new();
        for (epoch, payload) in raw {
            views.insert(epoch, view::decode(&payload)?);
        }
        Ok(views)
    }

    /// Publishes `view` as the next epoch. Succeeds only if
    /// `view.epoch == current_max_epoch + 1`.
    pub async fn propose_view(&self, view: &View) -> Result<()> {
        let payload = view::encode(view)?;
        self.backend
            .propose_view(&self.head_oid, view.epoch, payload)
            .await?;
        info!(epoch = view.epoch, "view proposed");
        Ok(())
    }

    /// Durably-incrementing id scoped to this log's head object.
    pub async fn unique_id(&self) -> Result<u64> {
        Ok(self.backend.unique_id(&self.head_oid).await?)
    }
}
