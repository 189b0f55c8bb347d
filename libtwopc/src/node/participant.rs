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

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::algorithm::Algorithm;
use crate::error::{InternalError, ParticipantError};
use crate::registry::{TransactionRecord, TransactionRegistry};
use crate::two_phase_commit::{
    validate_txid, Operation, OperationType, ParticipantAction, ParticipantActionNotification,
    ParticipantAlgorithm, ParticipantContext, ParticipantEvent, ParticipantReply,
    ParticipantState, ParticipantTransaction, TxId, Vote,
};
use crate::wal::{WalRecord, WriteAheadLog};

/// A snapshot of a participant for introspection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParticipantStatus {
    pub node: String,
    #[serde(rename = "tx")]
    pub transactions: BTreeMap<TxId, ParticipantTransaction>,
    #[serde(rename = "kv")]
    pub store: BTreeMap<String, Value>,
}

/// A participant: votes on prepared operations and applies them when told to commit.
///
/// All state is held behind one lock together with the log. The lock is held only while an
/// event's actions run, which is in-memory work plus at most one log append.
pub struct ParticipantNode {
    node_id: String,
    algorithm: ParticipantAlgorithm,
    shared: Mutex<ParticipantShared>,
}

pub(super) struct ParticipantShared {
    registry: TransactionRegistry<ParticipantTransaction>,
    store: BTreeMap<String, Value>,
    wal: Box<dyn WriteAheadLog>,
}

impl ParticipantShared {
    /// Rebuilds the registry and store by replaying the log.
    pub(super) fn restore(wal: Box<dyn WriteAheadLog>) -> Result<Self, InternalError> {
        let mut shared = ParticipantShared {
            registry: TransactionRegistry::new(),
            store: BTreeMap::new(),
            wal,
        };

        for record in shared.wal.replay()? {
            match record {
                WalRecord::PrepareVote {
                    txid,
                    vote: Vote::Yes,
                    op: Some(op),
                } => shared.registry.put(ParticipantTransaction::ready(txid, op)),
                WalRecord::PrepareVote { txid, vote: Vote::Yes, op: None } => {
                    return Err(InternalError::with_message(format!(
                        "yes vote for transaction {} was logged without its operation",
                        txid
                    )))
                }
                WalRecord::PrepareVote { txid, .. } | WalRecord::Abort { txid } => {
                    shared.registry.put(ParticipantTransaction::aborted(txid))
                }
                WalRecord::Commit { txid } => {
                    let op = shared
                        .registry
                        .get(&txid)
                        .filter(|record| record.state() == ParticipantState::Ready)
                        .and_then(|record| record.op().cloned())
                        .ok_or_else(|| {
                            InternalError::with_message(format!(
                                "commit for transaction {} was logged before a yes vote",
                                txid
                            ))
                        })?;
                    shared.apply(&op);
                    shared
                        .registry
                        .put(ParticipantTransaction::committed(txid, op));
                }
                record => {
                    return Err(InternalError::with_message(format!(
                        "record {} does not belong in a participant log",
                        record
                    )))
                }
            }
        }

        Ok(shared)
    }

    fn apply(&mut self, op: &Operation) {
        match op.op_type() {
            OperationType::Set => {
                self.store.insert(op.key().to_string(), op.value().clone());
            }
            OperationType::Delete => {
                self.store.remove(op.key());
            }
            OperationType::Other(name) => {
                warn!("Operation type {} has no effect on the store", name);
            }
        }
    }
}

impl ParticipantNode {
    pub(super) fn new(
        node_id: String,
        algorithm: ParticipantAlgorithm,
        shared: ParticipantShared,
    ) -> Self {
        let in_doubt = shared
            .registry
            .iter()
            .filter(|record| record.state() == ParticipantState::Ready)
            .count();

        if !shared.registry.is_empty() {
            info!(
                "[{}] Restored {} transactions from the log, {} awaiting a decision",
                node_id,
                shared.registry.len(),
                in_doubt
            );
        }

        ParticipantNode {
            node_id,
            algorithm,
            shared: Mutex::new(shared),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Votes on `op`. The vote is durable before it is returned.
    pub fn prepare(&self, txid: &str, op: Operation) -> Result<Vote, ParticipantError> {
        validate_txid(txid)?;

        match self.handle(txid, ParticipantEvent::Prepare(op))? {
            ParticipantReply::Vote(vote) => Ok(vote),
            reply => Err(unexpected_reply(txid, reply)),
        }
    }

    /// Applies the prepared operation.
    ///
    /// # Errors
    ///
    /// [`ParticipantError::TransactionNotPrepared`] if `txid` was never prepared here, or
    /// [`ParticipantError::InvalidStateTransition`] if it was aborted.
    pub fn commit(&self, txid: &str) -> Result<ParticipantState, ParticipantError> {
        match self.handle(txid, ParticipantEvent::Commit)? {
            ParticipantReply::State(state) => Ok(state),
            reply => Err(unexpected_reply(txid, reply)),
        }
    }

    /// Aborts the transaction. Repeated aborts succeed; aborting a committed transaction fails
    /// with [`ParticipantError::InvalidStateTransition`].
    pub fn abort(&self, txid: &str) -> Result<ParticipantState, ParticipantError> {
        validate_txid(txid)?;

        match self.handle(txid, ParticipantEvent::Abort)? {
            ParticipantReply::State(state) => Ok(state),
            reply => Err(unexpected_reply(txid, reply)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.shared.lock().store.get(key).cloned()
    }

    pub fn transaction(&self, txid: &str) -> Option<ParticipantTransaction> {
        self.shared.lock().registry.get(txid).cloned()
    }

    /// Transactions which voted yes and are still waiting for the coordinator's decision.
    pub fn in_doubt(&self) -> Vec<TxId> {
        self.shared
            .lock()
            .registry
            .iter()
            .filter(|record| record.state() == ParticipantState::Ready)
            .map(|record| record.txid().to_string())
            .collect()
    }

    pub fn status(&self) -> ParticipantStatus {
        let shared = self.shared.lock();
        ParticipantStatus {
            node: self.node_id.clone(),
            transactions: shared.registry.snapshot(),
            store: shared.store.clone(),
        }
    }

    // Run an event through the algorithm and perform its actions in order, under the lock.
    // The first failing action stops the rest, so a failed log append changes nothing and
    // produces no reply.
    fn handle(
        &self,
        txid: &str,
        event: ParticipantEvent,
    ) -> Result<ParticipantReply, ParticipantError> {
        let mut shared = self.shared.lock();

        let context = ParticipantContext::new(txid.to_string(), shared.registry.get(txid).cloned());
        let actions = self.algorithm.event(event, context).map_err(|err| {
            debug!("[{}] Rejected request for {}: {}", self.node_id, txid, err);
            ParticipantError::from(err)
        })?;

        let mut reply = None;
        for action in actions {
            match action {
                ParticipantAction::Log(record) => {
                    shared.wal.append(&record).map_err(|err| {
                        error!(
                            "[{}] Unable to log {}: {}",
                            self.node_id,
                            record,
                            err
                        );
                        ParticipantError::Wal(err)
                    })?;
                }
                ParticipantAction::Update(record) => shared.registry.put(record),
                ParticipantAction::Apply(op) => shared.apply(&op),
                ParticipantAction::Reply(r) => reply = Some(r),
                ParticipantAction::Notify(notification) => self.notify(txid, notification),
            }
        }

        reply.ok_or_else(|| {
            ParticipantError::Internal(InternalError::with_message(format!(
                "no reply produced for transaction {}",
                txid
            )))
        })
    }

    fn notify(&self, txid: &str, notification: ParticipantActionNotification) {
        match notification {
            ParticipantActionNotification::Voted(vote) => {
                debug!("[{}] Voted {} on {}", self.node_id, vote, txid)
            }
            ParticipantActionNotification::Committed => {
                debug!("[{}] Committed {}", self.node_id, txid)
            }
            ParticipantActionNotification::Aborted => {
                debug!("[{}] Aborted {}", self.node_id, txid)
            }
            ParticipantActionNotification::Redelivered(msg) => {
                debug!("[{}] Redelivered: {}", self.node_id, msg)
            }
        }
    }
}

fn unexpected_reply(txid: &str, reply: ParticipantReply) -> ParticipantError {
    ParticipantError::Internal(InternalError::with_message(format!(
        "unexpected reply {:?} for transaction {}",
        reply, txid
    )))
}
