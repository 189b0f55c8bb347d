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

use std::collections::BTreeMap;

use super::Decision;
use super::Operation;
use super::Vote;

#[derive(Clone, Debug)]
pub enum CoordinatorEvent {
    /// A client asked for the operation to be applied atomically on every participant.
    Start(Operation),

    /// The prepare round finished. Participants missing from the map are counted as
    /// `NoTimeout`.
    VotesCollected(BTreeMap<String, Vote>),

    /// A notification round finished; the listed participants acknowledged the decision.
    DecisionDelivered { acknowledged: Vec<String> },

    /// The transaction was found in the log on restart. `decision` is the logged decision, if
    /// one was logged, and `ended` is true if an `END` record was found.
    Recover {
        decision: Option<Decision>,
        ended: bool,
    },
}
