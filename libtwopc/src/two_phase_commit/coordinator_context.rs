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

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::algorithm::Context;
use crate::registry::TransactionRecord;

use super::Decision;
use super::TxId;
use super::Vote;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorState {
    Running,
    Done,
}

/// The coordinator's record of one transaction. Records are never removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorTransaction {
    txid: TxId,
    state: CoordinatorState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decision: Option<Decision>,
    #[serde(default)]
    votes: BTreeMap<String, Vote>,
    /// Participants which have not yet acknowledged the decision.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pending: BTreeSet<String>,
}

impl CoordinatorTransaction {
    pub fn running(txid: TxId) -> Self {
        CoordinatorTransaction {
            txid,
            state: CoordinatorState::Running,
            decision: None,
            votes: BTreeMap::new(),
            pending: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    pub fn votes(&self) -> &BTreeMap<String, Vote> {
        &self.votes
    }

    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending
    }

    pub(super) fn set_state(&mut self, state: CoordinatorState) {
        self.state = state;
    }

    pub(super) fn set_decision(&mut self, decision: Decision) {
        self.decision = Some(decision);
    }

    pub(super) fn set_votes(&mut self, votes: BTreeMap<String, Vote>) {
        self.votes = votes;
    }

    pub(super) fn pending_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.pending
    }
}

impl TransactionRecord for CoordinatorTransaction {
    fn txid(&self) -> &str {
        &self.txid
    }
}

/// The context a coordinator event is evaluated in: the transaction id, the participants every
/// transaction involves, and the coordinator's current record for the transaction, if any.
#[derive(Clone, Debug)]
pub struct CoordinatorContext {
    pub(super) txid: TxId,
    pub(super) participants: Vec<String>,
    pub(super) record: Option<CoordinatorTransaction>,
}

impl CoordinatorContext {
    pub fn new(
        txid: TxId,
        participants: Vec<String>,
        record: Option<CoordinatorTransaction>,
    ) -> Self {
        CoordinatorContext {
            txid,
            participants,
            record,
        }
    }
}

impl Context for CoordinatorContext {}
