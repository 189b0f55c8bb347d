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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithm::Context;
use crate::registry::TransactionRecord;

use super::Operation;
use super::TxId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantState {
    /// Voted yes; waiting for the coordinator's decision. A participant in this state may not
    /// abort on its own.
    Ready,
    Aborted,
    Committed,
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParticipantState::Ready => f.write_str("READY"),
            ParticipantState::Aborted => f.write_str("ABORTED"),
            ParticipantState::Committed => f.write_str("COMMITTED"),
        }
    }
}

/// A participant's record of one transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticipantTransaction {
    txid: TxId,
    state: ParticipantState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    op: Option<Operation>,
}

impl ParticipantTransaction {
    pub fn ready(txid: TxId, op: Operation) -> Self {
        ParticipantTransaction {
            txid,
            state: ParticipantState::Ready,
            op: Some(op),
        }
    }

    pub fn aborted(txid: TxId) -> Self {
        ParticipantTransaction {
            txid,
            state: ParticipantState::Aborted,
            op: None,
        }
    }

    pub fn committed(txid: TxId, op: Operation) -> Self {
        ParticipantTransaction {
            txid,
            state: ParticipantState::Committed,
            op: Some(op),
        }
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    pub fn op(&self) -> Option<&Operation> {
        self.op.as_ref()
    }
}

impl TransactionRecord for ParticipantTransaction {
    fn txid(&self) -> &str {
        &self.txid
    }
}

/// The context a participant event is evaluated in: the transaction id and the participant's
/// current record for it, if any.
#[derive(Clone, Debug)]
pub struct ParticipantContext {
    pub(super) txid: TxId,
    pub(super) record: Option<ParticipantTransaction>,
}

impl ParticipantContext {
    pub fn new(txid: TxId, record: Option<ParticipantTransaction>) -> Self {
        ParticipantContext { txid, record }
    }
}

impl Context for ParticipantContext {}
