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

/// Status codes returned by [`crate::Backend`] operations.
///
/// These are the semantic contract of the object state machine (see the
/// crate's module docs): every backend, regardless of what it stores data
/// in, must map its own failure modes onto exactly these variants so that
/// the operation pipeline can retry on them without inspecting error text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("epoch {epoch} is stale against sealed epoch {sealed_epoch}")]
    StaleEpoch { epoch: u64, sealed_epoch: u64 },

    #[error("position {position} on {oid} is read-only")]
    ReadOnly { oid: String, position: u64 },

    #[error("position {position} on {oid} has not been written")]
    NotWritten { oid: String, position: u64 },

    #[error("position {position} on {oid} has been invalidated")]
    Invalidated { oid: String, position: u64 },

    #[error("position {position} is not mapped by view epoch {epoch}")]
    Unmapped { epoch: u64, position: u64 },

    #[error("{oid} has never been sealed")]
    NotFound { oid: String },

    #[error("{0} already exists")]
    Exists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted record: {0}")]
    Corrupted(String),

    #[error("shutting down")]
    Shutdown,
}

impl Error {
    /// True for the subset of statuses the operation pipeline retries
    /// locally instead of surfacing to the caller.
    pub fn is_stale_epoch(&self) -> bool {
        matches!(self, Error::StaleEpoch { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Error::ReadOnly { .. })
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Corrupted(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
