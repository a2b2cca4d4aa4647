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

//! The view (a.k.a. projection): the configuration valid for a given epoch
//! — stripe layout plus sequencer identity. Views are immutable once
//! published; a [`crate::manager::ViewManager`] never hands out a `&mut
//! View`, only whole replacement values, matching the append-only chain the
//! backend itself enforces.

use serde::{Deserialize, Serialize};

/// One contiguous range of log positions mapped round-robin across `width`
/// stripe objects named `{prefix}.{0..width}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeMapping {
    pub start_pos: u64,
    pub end_pos: u64,
    pub prefix: String,
    pub width: u32,
}

impl StripeMapping {
    pub fn covers(&self, position: u64) -> bool {
        position >= self.start_pos && position <= self.end_pos
    }

    pub fn oid(&self, position: u64) -> String {
        let shard = position % self.width as u64;
        format!("{}.{}", self.prefix, shard)
    }
}

/// The sequencer nominated by a view, if any. A view without a sequencer is
/// waiting for a client to call `propose_sequencer` and publish a follow-up
/// view that names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerInfo {
    /// Equal to the epoch of the view in which this sequencer was
    /// nominated. A sequencer whose epoch trails the current view's is
    /// dead; callers detect this indirectly via `StaleEpoch` from the
    /// backend.
    pub epoch: u64,
    pub node_id: u64,
}

/// A single published view, keyed by `epoch` in the head object's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub epoch: u64,
    pub stripes: Vec<StripeMapping>,
    pub sequencer: Option<SequencerInfo>,
}

impl View {
    /// Returns the stripe object that owns `position`, or `None` if no
    /// stripe in this view covers it (the caller should expand the view).
    pub fn map(&self, position: u64) -> Option<String> {
        self.stripes
            .iter()
            .find(|s| s.covers(position))
            .map(|s| s.oid(position))
    }

    pub fn highest_mapped_position(&self) -> Option<u64> {
        self.stripes.iter().map(|s| s.end_pos).max()
    }
}

pub(crate) fn encode(view: &View) -> crate::Result<Vec<u8>> {
    Ok(bincode::serialize(view)?)
}

pub(crate) fn decode(bytes: &[u8]) -> crate::Result<View> {
    Ok(bincode::deserialize(bytes)?)
}
