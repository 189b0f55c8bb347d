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

use std::collections::BTreeSet;

use crate::algorithm::Algorithm;
use crate::error::{AlgorithmError, InternalError, InvalidStateError};
use crate::registry::TransactionRecord;
use crate::wal::WalRecord;

use super::CoordinatorAction;
use super::CoordinatorActionNotification;
use super::CoordinatorContext;
use super::CoordinatorEvent;
use super::CoordinatorState;
use super::CoordinatorTransaction;
use super::Decision;
use super::Vote;

/// The coordinator's prepare, decide, and notify algorithm for a single transaction.
#[derive(Default)]
pub struct CoordinatorAlgorithm;

impl CoordinatorAlgorithm {
    pub fn new() -> Self {
        CoordinatorAlgorithm
    }

    // Create the actions which finish a transaction once a notification round has completed or
    // the transaction was restored from the log. An END record is written the first time the
    // set of participants still owed the decision becomes empty.
    fn push_done_actions(
        &self,
        mut record: CoordinatorTransaction,
        was_owed: bool,
        actions: &mut Vec<CoordinatorAction>,
    ) {
        let finishing = record.state() == CoordinatorState::Running || was_owed;

        record.set_state(CoordinatorState::Done);

        if finishing && record.pending().is_empty() {
            actions.push(CoordinatorAction::Log(WalRecord::End {
                txid: record.txid().to_string(),
            }));
            actions.push(CoordinatorAction::Update(record));
            actions.push(CoordinatorAction::Notify(
                CoordinatorActionNotification::Completed,
            ));
        } else {
            actions.push(CoordinatorAction::Update(record));
        }
    }
}

impl Algorithm for CoordinatorAlgorithm {
    type Event = CoordinatorEvent;
    type Action = CoordinatorAction;
    type Context = CoordinatorContext;

    fn event(
        &self,
        event: Self::Event,
        context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError> {
        let CoordinatorContext {
            txid,
            participants,
            record,
        } = context;

        match event {
            // Steps:
            //   - Log the intent to run the transaction before contacting anyone
            //   - Record the transaction as Running
            //   - Ask every participant to prepare
            CoordinatorEvent::Start(op) => {
                if record.is_some() {
                    return Err(AlgorithmError::InvalidState(
                        InvalidStateError::with_message(format!(
                            "transaction {} already exists",
                            txid
                        )),
                    ));
                }

                Ok(vec![
                    CoordinatorAction::Log(WalRecord::Prepare { txid: txid.clone() }),
                    CoordinatorAction::Update(CoordinatorTransaction::running(txid)),
                    CoordinatorAction::SendPrepare(op),
                ])
            }

            // Every participant has answered or timed out, so the decision can be made.
            CoordinatorEvent::VotesCollected(mut votes) => {
                let mut record = record.ok_or_else(|| AlgorithmError::NotPrepared(txid.clone()))?;

                if record.state() != CoordinatorState::Running || record.decision().is_some() {
                    return Err(AlgorithmError::InvalidState(
                        InvalidStateError::with_message(format!(
                            "transaction {} has already been decided",
                            txid
                        )),
                    ));
                }

                // A participant with no recorded answer did not answer in time.
                for participant in &participants {
                    votes.entry(participant.clone()).or_insert(Vote::NoTimeout);
                }

                let decision = Decision::from_votes(votes.values());

                record.set_decision(decision);
                record.set_votes(votes);
                *record.pending_mut() = participants.iter().cloned().collect::<BTreeSet<_>>();

                // The order of actions here is important! The decision must be durable before
                // it is sent to any participant; otherwise a crash could leave participants
                // holding a decision the coordinator does not remember.
                Ok(vec![
                    CoordinatorAction::Log(WalRecord::Decision {
                        txid: txid.clone(),
                        decision,
                    }),
                    CoordinatorAction::Update(record),
                    CoordinatorAction::Notify(CoordinatorActionNotification::Decided(decision)),
                    CoordinatorAction::SendDecision {
                        decision,
                        participants,
                    },
                ])
            }

            // A round of commit or abort messages finished. Participants which acknowledged are
            // no longer owed the decision; the rest stay pending for redelivery.
            CoordinatorEvent::DecisionDelivered { acknowledged } => {
                let mut record = record.ok_or_else(|| AlgorithmError::NotPrepared(txid.clone()))?;

                if record.decision().is_none() {
                    return Err(AlgorithmError::InvalidState(
                        InvalidStateError::with_message(format!(
                            "transaction {} has no decision to deliver",
                            txid
                        )),
                    ));
                }

                let was_owed = !record.pending().is_empty();
                for participant in &acknowledged {
                    record.pending_mut().remove(participant);
                }

                let mut actions = Vec::new();
                self.push_done_actions(record, was_owed, &mut actions);
                Ok(actions)
            }

            // Rebuild the record of a transaction found in the log. A transaction which never
            // reached a decision is aborted; every participant may be waiting on it.
            CoordinatorEvent::Recover { decision, ended } => {
                if record.is_some() {
                    return Err(AlgorithmError::InvalidState(
                        InvalidStateError::with_message(format!(
                            "transaction {} has already been restored",
                            txid
                        )),
                    ));
                }

                let mut actions = Vec::new();
                let mut recovered = CoordinatorTransaction::running(txid.clone());

                let decision = match (decision, ended) {
                    (Some(decision), _) => decision,
                    (None, false) => {
                        actions.push(CoordinatorAction::Log(WalRecord::Decision {
                            txid: txid.clone(),
                            decision: Decision::Abort,
                        }));
                        actions.push(CoordinatorAction::Notify(
                            CoordinatorActionNotification::PresumedAbort,
                        ));
                        Decision::Abort
                    }
                    (None, true) => {
                        return Err(AlgorithmError::Internal(InternalError::with_message(
                            format!("transaction {} ended without a decision", txid),
                        )))
                    }
                };

                recovered.set_decision(decision);

                if ended {
                    recovered.set_state(CoordinatorState::Done);
                    actions.push(CoordinatorAction::Update(recovered));
                    return Ok(actions);
                }

                *recovered.pending_mut() = participants.into_iter().collect();
                if !recovered.pending().is_empty() {
                    actions.push(CoordinatorAction::Notify(
                        CoordinatorActionNotification::InDoubt(decision),
                    ));
                }
                self.push_done_actions(recovered, false, &mut actions);

                Ok(actions)
            }
        }
    }
}
