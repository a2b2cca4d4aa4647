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

//! A distributed, strongly-consistent shared log striped across
//! object-store objects, fenced by epoch-sealed reconfiguration.
//!
//! This crate is a thin facade over four workspace members:
//!
//! - [`storage`] — the backend contract and its in-memory and
//!   object-store-backed implementations.
//! - [`journal`] — the view chain and sequencer client.
//! - [`kernel`] — the striper, operation pipeline, and [`Log`] facade.
//! - `runtime` — the OS-thread worker pool the pipeline runs on.
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> kernel::Result<()> {
//! use std::sync::Arc;
//!
//! use storage::mem::MemBackend;
//!
//! let backend: Arc<dyn storage::Backend> = Arc::new(MemBackend::new());
//! let log = kernel::Log::create_or_open(backend, "my-log", kernel::Options::default()).await?;
//! let position = log.append(b"hello".to_vec()).await?;
//! assert_eq!(log.read(position).await?, b"hello");
//! # Ok(())
//! # }
//! ```

pub use kernel::{Error, Log, Options, Result};
pub use storage::Backend;

/// Re-exported so callers composing a custom [`storage::object_store`]
/// backend or a remote [`journal::Sequencer`] don't need a second path
/// dependency on top of this facade crate.
pub use journal;
pub use runtime;
pub use storage;
