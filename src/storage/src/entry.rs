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

//! The per-object log-entry state machine (OSM).
//!
//! [`StripeObjectState`] is the pure, backend-agnostic state machine that
//! every [`crate::Backend`] implementation applies under an epoch guard.
//! Keeping it independent of any particular storage medium means the
//! in-memory and object-store backends can share a single source of truth
//! for write/read/fill/trim/seal semantics instead of re-deriving them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The state of a single log position within a stripe object.
///
/// Absence of a key in [`StripeObjectState::entries`] represents `Empty`;
/// there is no explicit `Empty` variant because empty entries are never
/// materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    Written(Vec<u8>),
    Invalidated,
    Trimmed,
}

/// Durable state of one stripe object: its sealed epoch, its sparse entry
/// index, and the maximum position ever touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StripeObjectState {
    /// 0 means "never sealed"; see [`crate::Backend::seal`].
    pub sealed_epoch: u64,
    pub max_position: Option<u64>,
    pub entries: BTreeMap<u64, EntryState>,
}

impl StripeObjectState {
    /// Guard used by every read-path and write-path operation: `epoch <
    /// sealed_epoch` is always stale.
    fn guard_epoch(&self, epoch: u64) -> Result<()> {
        if epoch < self.sealed_epoch {
            return Err(Error::StaleEpoch {
                epoch,
                sealed_epoch: self.sealed_epoch,
            });
        }
        Ok(())
    }

    pub fn write(&mut self, oid: &str, epoch: u64, position: u64, data: Vec<u8>) -> Result<()> {
        self.guard_epoch(epoch)?;
        if self.entries.contains_key(&position) {
            return Err(Error::ReadOnly {
                oid: oid.to_string(),
                position,
            });
        }
        self.entries.insert(position, EntryState::Written(data));
        self.bump_max_position(position);
        Ok(())
    }

    pub fn read(&self, oid: &str, epoch: u64, position: u64) -> Result<Vec<u8>> {
        self.guard_epoch(epoch)?;
        match self.entries.get(&position) {
            None => Err(Error::NotWritten {
                oid: oid.to_string(),
                position,
            }),
            Some(EntryState::Written(data)) => Ok(data.clone()),
            Some(EntryState::Invalidated) | Some(EntryState::Trimmed) => Err(Error::Invalidated {
                oid: oid.to_string(),
                position,
            }),
        }
    }

    pub fn fill(&mut self, oid: &str, epoch: u64, position: u64) -> Result<()> {
        self.guard_epoch(epoch)?;
        match self.entries.get(&position) {
            None => {
                self.entries.insert(position, EntryState::Invalidated);
                self.bump_max_position(position);
                Ok(())
            }
            Some(EntryState::Invalidated) | Some(EntryState::Trimmed) => Ok(()),
            Some(EntryState::Written(_)) => Err(Error::ReadOnly {
                oid: oid.to_string(),
                position,
            }),
        }
    }

    pub fn trim(&mut self, oid: &str, epoch: u64, position: u64) -> Result<()> {
        self.guard_epoch(epoch)?;
        self.entries.insert(position, EntryState::Trimmed);
        self.bump_max_position(position);
        Ok(())
    }

    /// Seal is the only operation whose epoch test is strict: equal epochs
    /// are rejected, unlike every other op where `epoch == sealed_epoch` is
    /// fine.
    pub fn seal(&mut self, epoch: u64) -> Result<()> {
        if self.sealed_epoch != 0 && epoch <= self.sealed_epoch {
            return Err(Error::StaleEpoch {
                epoch,
                sealed_epoch: self.sealed_epoch,
            });
        }
        self.sealed_epoch = epoch;
        Ok(())
    }

    pub fn max_pos(&self, epoch: u64) -> Result<(Option<u64>, bool)> {
        if epoch != self.sealed_epoch {
            return Err(Error::StaleEpoch {
                epoch,
                sealed_epoch: self.sealed_epoch,
            });
        }
        Ok((self.max_position, self.entries.is_empty()))
    }

    fn bump_max_position(&mut self, position: u64) {
        self.max_position = Some(self.max_position.map_or(position, |cur| cur.max(position)));
    }
}
