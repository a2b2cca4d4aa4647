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

//! The striper: the client-side cache over the view chain. Every other
//! piece of the pipeline talks to the log's configuration exclusively
//! through this type, never through [`journal::ViewManager`] directly, so
//! that caching and view-expansion policy live in exactly one place.

use std::{collections::BTreeMap, sync::Arc};

use journal::{LocalSequencer, Sequencer, SequencerInfo, StripeMapping, View, ViewManager};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

struct Cache {
    views: BTreeMap<u64, Arc<View>>,
    sequencer: Option<Arc<dyn Sequencer>>,
}

/// Caches the view chain for one log and implements the policy described
/// for the striper: read the current view, map a position to a stripe
/// object, refresh the cache from the backend, and expand the view when a
/// position falls outside every known stripe.
pub struct Striper {
    manager: ViewManager,
    node_id: u64,
    stripe_width: u32,
    entries_per_stripe_object: u64,
    cache: SyncMutex<Cache>,
    /// Serializes head-object refreshes: concurrent callers observing the
    /// same stale epoch should trigger exactly one backend round trip.
    refresh_gate: AsyncMutex<()>,
}

impl Striper {
    pub async fn new(
        manager: ViewManager,
        node_id: u64,
        stripe_width: u32,
        entries_per_stripe_object: u64,
    ) -> Result<Self> {
        let views = manager.read_views(1, u32::MAX).await?;
        // Only materialize a live counter when this client is the one the
        // view actually nominates — handing out a fresh `LocalSequencer`
        // for a sequencer some *other* node owns would let two clients
        // issue colliding positions independently.
        let sequencer = views
            .values()
            .next_back()
            .and_then(|v| v.sequencer)
            .filter(|info| info.node_id == node_id)
            .map(|info| Arc::new(LocalSequencer::new(info.epoch)) as Arc<dyn Sequencer>);
        Ok(Striper {
            manager,
            node_id,
            stripe_width,
            entries_per_stripe_object,
            cache: SyncMutex::new(Cache {
                views: views.into_iter().map(|(e, v)| (e, Arc::new(v))).collect(),
                sequencer,
            }),
            refresh_gate: AsyncMutex::new(()),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.manager.prefix
    }

    /// The highest-epoch cached view.
    pub fn view(&self) -> Arc<View> {
        let cache = self.cache.lock();
        cache
            .views
            .values()
            .next_back()
            .cloned()
            .expect("a log always has at least its genesis view cached")
    }

    pub fn sequencer(&self) -> Option<Arc<dyn Sequencer>> {
        self.cache.lock().sequencer.clone()
    }

    /// Maps `position` under `view`, returning `None` (Unmapped) if no
    /// stripe in it covers the position.
    pub fn map(&self, view: &View, position: u64) -> Option<String> {
        view.map(position)
    }

    /// Re-reads the head object starting at `seen_epoch + 1` and installs
    /// any newer views. Only one refresh is in flight at a time; concurrent
    /// callers wait for it rather than issuing redundant reads.
    pub async fn update_current_view(&self, seen_epoch: u64) -> Result<()> {
        let _permit = self.refresh_gate.lock().await;

        // Another caller may have already advanced the cache past
        // `seen_epoch` while we waited for the gate.
        if self.view().epoch > seen_epoch {
            return Ok(());
        }

        let fresh = self.manager.read_views(seen_epoch + 1, u32::MAX).await?;
        if fresh.is_empty() {
            return Ok(());
        }
        debug!(from = seen_epoch + 1, count = fresh.len(), "striper refreshed view chain");
        let mut cache = self.cache.lock();
        for (epoch, view) in fresh {
            if let Some(info) = view.sequencer {
                if info.node_id == self.node_id {
                    if cache.sequencer.as_ref().map(|s| s.epoch()) != Some(info.epoch) {
                        cache.sequencer = Some(Arc::new(LocalSequencer::new(info.epoch)));
                    }
                } else {
                    // Some other node owns this epoch's sequencer; we have
                    // no local counter to issue positions from.
                    cache.sequencer = None;
                }
            }
            cache.views.insert(epoch, Arc::new(view));
        }
        Ok(())
    }

    /// If `position` is unmapped under the current view, synthesizes a new
    /// view that extends coverage to include it and proposes it. On a
    /// concurrent proposer winning the race (`StaleEpoch`), refreshes
    /// instead of retrying the proposal itself — the caller's retry loop
    /// will re-check mapping against the refreshed view.
    pub async fn try_expand_view(&self, position: u64) -> Result<()> {
        let current = self.view();
        if current.map(position).is_some() {
            return Ok(());
        }

        let next_epoch = current.epoch + 1;
        let start_pos = current.highest_mapped_position().map_or(0, |p| p + 1);
        let end_pos = start_pos + self.entries_per_stripe_object - 1;
        let shard_id = self.manager.unique_id().await?;

        let mut stripes = current.stripes.clone();
        stripes.push(StripeMapping {
            start_pos: start_pos.min(position),
            end_pos: end_pos.max(position),
            prefix: format!("{}.v{}.{}", self.manager.prefix, next_epoch, shard_id),
            width: self.stripe_width,
        });

        let next_view = View {
            epoch: next_epoch,
            stripes,
            sequencer: current.sequencer,
        };

        match self.manager.propose_view(&next_view).await {
            Ok(()) => {
                info!(epoch = next_epoch, position, "view expanded");
                self.cache.lock().views.insert(next_epoch, Arc::new(next_view));
                Ok(())
            }
            Err(e) if e.is_stale_epoch() => {
                self.update_current_view(current.epoch).await?;
                Ok(())
            }
            Err(e) => Err(Error::Journal(e)),
        }
    }

    /// Publishes a new view naming this client as sequencer, if the
    /// current view does not already have one. Loses the race gracefully:
    /// on `StaleEpoch` it refreshes and lets the caller observe whatever
    /// sequencer won.
    pub async fn propose_sequencer(&self) -> Result<()> {
        let current = self.view();
        if current.sequencer.is_some() {
            return Ok(());
        }

        let next_epoch = current.epoch + 1;
        let info = SequencerInfo {
            epoch: next_epoch,
            node_id: self.node_id,
        };
        let next_view = View {
            epoch: next_epoch,
            stripes: current.stripes.clone(),
            sequencer: Some(info),
        };

        match self.manager.propose_view(&next_view).await {
            Ok(()) => {
                info!(epoch = next_epoch, node_id = self.node_id, "sequencer nominated");
                let mut cache = self.cache.lock();
                cache.views.insert(next_epoch, Arc::new(next_view));
                cache.sequencer = Some(Arc::new(LocalSequencer::new(next_epoch)));
                Ok(())
            }
            Err(e) if e.is_stale_epoch() => {
                self.update_current_view(current.epoch).await?;
                Ok(())
            }
            Err(e) => Err(Error::Journal(e)),
        }
    }
}
