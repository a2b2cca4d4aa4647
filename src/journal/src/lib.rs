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

//! A stripelog module that provides view-chain and sequencer abstractions
//! and implementations.
//!
//! # Abstraction
//!
//! [`View`] is the configuration valid at a given epoch; [`ViewManager`]
//! publishes and reads the chain of views backing one log; [`Sequencer`]
//! issues the monotone append positions valid within one view's epoch.
//!
//! # Implementation
//!
//! - [`LocalSequencer`] — an in-memory sequencer for single-process
//!   deployments and tests.

mod error;
mod manager;
mod sequencer;
mod view;

pub use self::{
    error::{Error, Result},
    manager::ViewManager,
    sequencer::{LocalSequencer, Sequencer},
    view::{SequencerInfo, StripeMapping, View},
};
