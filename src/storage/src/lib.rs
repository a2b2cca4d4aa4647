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

//! A stripelog module that provides object storage abstractions and
//! implementations.
//!
//! # Abstraction
//!
//! [`Backend`] is the trait every higher-level crate (`journal`, `kernel`)
//! talks to: a namespace of head/link objects holding view chains, and a
//! namespace of stripe objects holding log entries, each governed by the
//! epoch-fenced state machine in [`entry`].
//!
//! # Implementation
//!
//! * [`mem`] — a single-process, in-memory backend for tests and
//!   non-durable embedding.
//! * [`object_store`] — drives an arbitrary compare-and-swap blob store.

mod backend;
mod entry;
mod error;
pub mod mem;
pub mod object_store;

pub use backend::Backend;
pub use entry::{EntryState, StripeObjectState};
pub use error::{Error, Result};
