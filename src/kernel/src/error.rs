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

/// Errors surfaced by the [`crate::Log`] facade: the outermost layer of the
/// error hierarchy, wrapping both the view-chain layer and the raw backend
/// layer the way the teacher's `consensus::error` wraps lower-level crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Journal(#[from] journal::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error("position {0} has not been written")]
    NotWritten(u64),

    #[error("position {0} has been invalidated")]
    Invalidated(u64),

    #[error("position {0} does not exist and never will")]
    NotFound(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("log is shutting down")]
    Shutdown,

    #[error("epoch {epoch} names node {node_id} as sequencer; this client is not that node and has no remote sequencer configured")]
    NoLocalSequencer { epoch: u64, node_id: u64 },
}

impl Error {
    pub fn is_stale_epoch(&self) -> bool {
        match self {
            Error::Journal(e) => e.is_stale_epoch(),
            Error::Storage(e) => e.is_stale_epoch(),
            _ => false,
        }
    }

    pub fn is_not_found_backend(&self) -> bool {
        match self {
            Error::Journal(e) => e.is_not_found(),
            Error::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Error::Storage(storage::Error::ReadOnly { .. }))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
