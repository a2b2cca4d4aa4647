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

/// Errors raised by the view chain and sequencer layer.
///
/// Wraps [`storage::Error`] the way the teacher's `grpc::error` module wraps
/// transport errors into its own `Error`: this crate never re-derives
/// backend semantics, it forwards them and adds the handful of failure
/// modes that only make sense above the backend (a view payload that won't
/// decode, a sequencer nominated for the wrong epoch).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error("malformed view payload: {0}")]
    MalformedView(String),

    #[error("sequencer epoch {sequencer_epoch} does not match view epoch {view_epoch}")]
    StaleSequencer {
        sequencer_epoch: u64,
        view_epoch: u64,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn is_stale_epoch(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_stale_epoch())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_not_found())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::MalformedView(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
