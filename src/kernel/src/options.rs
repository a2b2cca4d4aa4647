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

/// Configuration for a [`crate::Log`], following the same
/// plain-struct-with-doc-commented-defaults shape as the teacher's log
/// option types.
///
/// Backend selection itself is not part of `Options`: [`crate::Log::create_or_open`]
/// takes an already-constructed `Arc<dyn storage::Backend>`, and choosing
/// between e.g. [`storage::mem::MemBackend`] and
/// [`storage::object_store::ObjectStoreBackend`] (and wiring up the latter's
/// concrete `ObjectStore`) is entirely the caller's responsibility.
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of OS-level finisher threads draining the operation pipeline.
    ///
    /// DEFAULT: 4
    pub finisher_threads: usize,

    /// Maximum number of operations admitted into the pipeline at once;
    /// further submissions block until one completes.
    ///
    /// DEFAULT: 64
    pub max_inflight_ops: usize,

    /// Number of stripe objects a freshly-proposed view round-robins
    /// writes across.
    ///
    /// DEFAULT: 8
    pub stripe_width: u32,

    /// Number of contiguous log positions each stripe mapping covers
    /// before the striper must expand the view again.
    ///
    /// DEFAULT: 4096
    pub entries_per_stripe_object: u64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            finisher_threads: 4,
            max_inflight_ops: 64,
            stripe_width: 8,
            entries_per_stripe_object: 4096,
        }
    }
}
