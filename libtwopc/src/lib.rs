// Copyright 2021-2022 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A durable Two-Phase Commit coordinator and participant.
//!
//! The decisions of the protocol are made by the algorithms in [`two_phase_commit`], which turn
//! an event and the current record of a transaction into an ordered list of actions. The nodes in
//! [`node`] perform those actions: they write to the [`wal`], update their registry, and talk to
//! each other over a [`links::ParticipantClient`].

#[macro_use]
extern crate log;

mod algorithm;
pub mod error;
pub mod links;
pub mod node;
pub mod registry;
pub mod two_phase_commit;
pub mod wal;

pub use algorithm::{Action, Algorithm, Context};
