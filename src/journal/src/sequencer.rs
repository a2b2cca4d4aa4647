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

//! The sequencer client: issues monotone append positions for the epoch in
//! which it was nominated. [`LocalSequencer`] multiplexes a local counter
//! (sequencer co-located with the calling client, the common case for a
//! single-process deployment); a remote sequencer satisfies the same
//! [`Sequencer`] contract over whatever transport a deployment chooses, so
//! the operation pipeline never distinguishes the two.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{view::SequencerInfo, Result};

/// Issues append positions for a single epoch. A `Sequencer` is valid only
/// for the epoch it was nominated at; once a view names a different
/// sequencer epoch, this one is considered dead.
#[async_trait::async_trait]
pub trait Sequencer: Send + Sync + 'static {
    fn epoch(&self) -> u64;

    /// Returns the next position. When `increment` is `true`, the
    /// sequencer's internal counter advances so a subsequent call returns a
    /// fresh position; `increment = false` is a read-only tail query.
    async fn check_tail(&self, increment: bool) -> Result<u64>;
}

/// An in-memory sequencer, suitable for a single-process deployment or for
/// tests. Positions start at 0.
pub struct LocalSequencer {
    epoch: u64,
    next: AtomicU64,
}

impl LocalSequencer {
    pub fn new(epoch: u64) -> Self {
        LocalSequencer {
            epoch,
            next: AtomicU64::new(0),
        }
    }

    pub fn info(&self, node_id: u64) -> SequencerInfo {
        SequencerInfo {
            epoch: self.epoch,
            node_id,
        }
    }
}

#[async_trait::async_trait]
impl Sequencer for LocalSequencer {
    fn epoch(&self) -> u64 {
        self.epoch
    }

    async fn check_tail(&self, increment: bool) -> Result<u64> {
        if increment {
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        } else {
            Ok(self.next.load(Ordering::SeqCst))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increments_assign_distinct_monotone_positions() {
        let seq = LocalSequencer::new(1);
        let a = seq.check_tail(true).await.unwrap();
        let b = seq.check_tail(true).await.unwrap();
        assert_eq!(b, a + 1);
    }

    #[tokio::test]
    async fn non_incrementing_call_does_not_advance() {
        let seq = LocalSequencer::new(1);
        seq.check_tail(true).await.unwrap();
        let peek1 = seq.check_tail(false).await.unwrap();
        let peek2 = seq.check_tail(false).await.unwrap();
        assert_eq!(peek1, peek2);
    }
}
