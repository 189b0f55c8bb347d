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

//! The `Algorithm` abstraction shared by the coordinator and participant state machines.
//!
//! An algorithm never performs I/O. It receives an event together with the context it applies
//! to, and returns the actions which must be performed, in order, to carry the event out. The
//! node which owns the algorithm executes those actions: durable log writes, state updates, and
//! messages. Because the order of the returned actions is significant, an algorithm can state
//! "log before reply" once, and every node that runs it inherits the guarantee.

use crate::error::AlgorithmError;

pub trait Action {}
pub trait Context {}

pub trait Algorithm {
    type Event;
    type Action: Action;
    type Context: Context;

    /// Process an event against the given context, producing the ordered list of actions that
    /// carry the event out.
    ///
    /// # Errors
    ///
    /// Returns an [`AlgorithmError`] if the event is not valid for the context, in which case no
    /// action may be taken.
    fn event(
        &self,
        event: Self::Event,
        context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError>;
}
