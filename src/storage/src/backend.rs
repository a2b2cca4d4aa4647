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

use std::collections::{BTreeMap, HashMap};

use crate::error::Result;

/// The contract the rest of the crate hierarchy (`journal`, `kernel`)
/// invokes exclusively through. A `Backend` owns both the head-object /
/// view-chain namespace and the stripe-object namespace for every log it
/// serves; it is expected to serialize operations against the same object
/// so that the state machine in [`crate::entry`] observes a consistent
/// view of `sealed_epoch` and the entry index.
///
/// Two reference implementations ship in this crate: [`crate::mem`] (a
/// single-process in-memory backend, used by tests and by callers that do
/// not need durability) and [`crate::object_store`] (a backend that drives
/// an arbitrary CAS-capable blob store).
#[async_trait::async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Implementation-defined metadata (e.g. connection info) for display
    /// or diagnostics; never consulted by the core log logic.
    fn meta(&self) -> HashMap<String, String>;

    async fn initialize(&self, opts: HashMap<String, String>) -> Result<()>;

    /// Returns a durably-incrementing id scoped to `head_oid`. Used by
    /// callers that need a cluster-unique token (e.g. to name a freshly
    /// expanded stripe object).
    async fn unique_id(&self, head_oid: &str) -> Result<u64>;

    /// Creates the link object and head object for a brand-new log, and
    /// proposes `view_payload` as view epoch 1. Fails with
    /// [`crate::error::Error::Exists`] if the name is already bound.
    async fn create_log(&self, name: &str, view_payload: Vec<u8>) -> Result<(String, String)>;

    /// Resolves an existing log's head object id and stripe-object name
    /// prefix via its link object.
    async fn open_log(&self, name: &str) -> Result<(String, String)>;

    /// Returns up to `max` consecutive views starting at `start_epoch`, in
    /// epoch order with no gaps. Empty if `start_epoch` is beyond the
    /// highest stored epoch.
    async fn read_views(
        &self,
        head_oid: &str,
        start_epoch: u64,
        max: u32,
    ) -> Result<BTreeMap<u64, Vec<u8>>>;

    /// Appends view `epoch` to the head object's chain. Succeeds only if
    /// `epoch` is exactly one past the currently-stored maximum.
    async fn propose_view(&self, head_oid: &str, epoch: u64, payload: Vec<u8>) -> Result<()>;

    async fn read(&self, oid: &str, epoch: u64, position: u64) -> Result<Vec<u8>>;

    async fn write(&self, oid: &str, data: Vec<u8>, epoch: u64, position: u64) -> Result<()>;

    async fn fill(&self, oid: &str, epoch: u64, position: u64) -> Result<()>;

    async fn trim(&self, oid: &str, epoch: u64, position: u64) -> Result<()>;

    /// Lazily materializes `oid` if it doesn't yet exist, or advances its
    /// sealed epoch. Epoch test is strict (`epoch > sealed_epoch`), unlike
    /// every other op.
    async fn seal(&self, oid: &str, epoch: u64) -> Result<()>;

    async fn max_pos(&self, oid: &str, epoch: u64) -> Result<(Option<u64>, bool)>;
}
