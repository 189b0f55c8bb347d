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

use crate::algorithm::Action;
use crate::wal::WalRecord;

use super::Operation;
use super::ParticipantState;
use super::ParticipantTransaction;
use super::Vote;

/// An action a participant node must perform, in the order given, to carry out an event.
#[derive(Clone, Debug, PartialEq)]
pub enum ParticipantAction {
    /// Durably append a record to the log. If this fails, no later action may run.
    Log(WalRecord),
    /// Replace the transaction's record in the registry.
    Update(ParticipantTransaction),
    /// Apply a committed operation to the local store.
    Apply(Operation),
    Reply(ParticipantReply),
    Notify(ParticipantActionNotification),
}

impl Action for ParticipantAction {}

/// The answer returned to the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum ParticipantReply {
    Vote(Vote),
    State(ParticipantState),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParticipantActionNotification {
    Voted(Vote),
    Committed,
    Aborted,
    /// A request repeated one that was already carried out; it was answered without a change.
    Redelivered(String),
}
