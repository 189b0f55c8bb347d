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

use super::CoordinatorTransaction;
use super::Decision;
use super::Operation;

/// An action a coordinator node must perform, in the order given, to carry out an event.
///
/// `Log`, `Update`, and `Notify` are local and are performed while the node's state is locked.
/// `SendPrepare` and `SendDecision` are performed afterwards, without the lock.
#[derive(Clone, Debug, PartialEq)]
pub enum CoordinatorAction {
    /// Durably append a record to the log. If this fails, no later action may run.
    Log(WalRecord),
    Update(CoordinatorTransaction),
    /// Ask every participant to prepare the operation.
    SendPrepare(Operation),
    /// Deliver the decision to the listed participants.
    SendDecision {
        decision: Decision,
        participants: Vec<String>,
    },
    Notify(CoordinatorActionNotification),
}

impl CoordinatorAction {
    /// Returns true if the action leaves the node.
    pub fn is_send(&self) -> bool {
        matches!(
            self,
            CoordinatorAction::SendPrepare(_) | CoordinatorAction::SendDecision { .. }
        )
    }
}

impl Action for CoordinatorAction {}

#[derive(Clone, Debug, PartialEq)]
pub enum CoordinatorActionNotification {
    Decided(Decision),
    /// Every participant acknowledged the decision.
    Completed,
    /// A transaction was found in the log without a decision; it has been aborted.
    PresumedAbort,
    /// A transaction was found in the log with a decision not yet acknowledged by every
    /// participant; it will be redelivered.
    InDoubt(Decision),
}
