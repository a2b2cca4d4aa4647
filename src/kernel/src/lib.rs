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

//! A stripelog module that provides stateful environment abstractions and
//! implementations: the striper, the operation pipeline, and the [`Log`]
//! facade composing them over a [`storage::Backend`].

mod error;
mod log;
mod options;
mod pipeline;
mod striper;
mod waiter;

pub use self::{
    error::{Error, Result},
    log::Log,
    options::Options,
};
