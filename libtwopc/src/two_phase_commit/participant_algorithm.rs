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
use crate::wal::WalRecord;

use super::OperationType;
use super::ParticipantAction;
use super::ParticipantActionNotification;
use super::ParticipantContext;
use super::ParticipantEvent;
use super::ParticipantReply;
use super::ParticipantState;
use super::ParticipantTransaction;
use super::Vote;

/// The participant's vote and apply state machine.
///
/// States move from none to `Ready` to `Committed`, or from none or `Ready` to `Aborted`.
/// `Committed` and `Aborted` are terminal.
pub struct ParticipantAlgorithm {
    supported_operations: BTreeSet<OperationType>,
}

impl ParticipantAlgorithm {
    pub fn new(supported_operations: BTreeSet<OperationType>) -> Self {
        ParticipantAlgorithm {
            supported_operations,
        }
    }

    pub fn supports(&self, op_type: &OperationType) -> bool {
        self.supported_operations.contains(op_type)
    }
}

impl Default for ParticipantAlgorithm {
    fn default() -> Self {
        ParticipantAlgorithm::new(BTreeSet::from([OperationType::Set]))
    }
}

impl Algorithm for ParticipantAlgorithm {
    type Event = ParticipantEvent;
    type Action = ParticipantAction;
    type Context = ParticipantContext;

    fn event(
        &self,
        event: Self::Event,
        context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError> {
        let ParticipantContext { txid, record } = context;

        // In every branch below, the Log action comes first. The node stops at the first action
        // that fails, so a failed log write leaves the registry and store untouched and sends no
        // reply.
        match event {
            ParticipantEvent::Prepare(op) => {
                // A repeated prepare is answered from the existing record; the vote was already
                // logged and must not change.
                if let Some(record) = record {
                    let vote = match record.state() {
                        ParticipantState::Ready | ParticipantState::Committed => Vote::Yes,
                        ParticipantState::Aborted => Vote::No,
                    };
                    return Ok(vec![
                        ParticipantAction::Reply(ParticipantReply::Vote(vote)),
                        ParticipantAction::Notify(ParticipantActionNotification::Redelivered(
                            format!("prepare for known transaction {}", txid),
                        )),
                    ]);
                }

                if self.supports(op.op_type()) {
                    Ok(vec![
                        ParticipantAction::Log(WalRecord::PrepareVote {
                            txid: txid.clone(),
                            vote: Vote::Yes,
                            op: Some(op.clone()),
                        }),
                        ParticipantAction::Update(ParticipantTransaction::ready(txid, op)),
                        ParticipantAction::Reply(ParticipantReply::Vote(Vote::Yes)),
                        ParticipantAction::Notify(ParticipantActionNotification::Voted(
                            Vote::Yes,
                        )),
                    ])
                } else {
                    Ok(vec![
                        ParticipantAction::Log(WalRecord::PrepareVote {
                            txid: txid.clone(),
                            vote: Vote::No,
                            op: None,
                        }),
                        ParticipantAction::Update(ParticipantTransaction::aborted(txid)),
                        ParticipantAction::Reply(ParticipantReply::Vote(Vote::No)),
                        ParticipantAction::Notify(ParticipantActionNotification::Voted(Vote::No)),
                    ])
                }
            }

            ParticipantEvent::Commit => {
                let record = record.ok_or_else(|| AlgorithmError::NotPrepared(txid.clone()))?;

                match record.state() {
                    ParticipantState::Ready => {
                        let op = record.op().cloned().ok_or_else(|| {
                            InternalError::with_message(format!(
                                "transaction {} is ready but has no operation",
                                txid
                            ))
                        })?;

                        Ok(vec![
                            ParticipantAction::Log(WalRecord::Commit { txid: txid.clone() }),
                            ParticipantAction::Apply(op.clone()),
                            ParticipantAction::Update(ParticipantTransaction::committed(txid, op)),
                            ParticipantAction::Reply(ParticipantReply::State(
                                ParticipantState::Committed,
                            )),
                            ParticipantAction::Notify(ParticipantActionNotification::Committed),
                        ])
                    }

                    // The coordinator redelivers decisions it has no acknowledgement for. The
                    // operation was applied once and must not be applied again.
                    ParticipantState::Committed => Ok(vec![
                        ParticipantAction::Reply(ParticipantReply::State(
                            ParticipantState::Committed,
                        )),
                        ParticipantAction::Notify(ParticipantActionNotification::Redelivered(
                            format!("commit for committed transaction {}", txid),
                        )),
                    ]),

                    ParticipantState::Aborted => Err(AlgorithmError::InvalidState(
                        InvalidStateError::with_message(format!(
                            "cannot commit transaction {} in state {}",
                            txid,
                            record.state()
                        )),
                    )),
                }
            }

            ParticipantEvent::Abort => {
                // A commit is terminal; an abort after it means the coordinator is broken.
                if let Some(record) = record
                    .as_ref()
                    .filter(|r| r.state() == ParticipantState::Committed)
                {
                    return Err(AlgorithmError::InvalidState(
                        InvalidStateError::with_message(format!(
                            "cannot abort transaction {} in state {}",
                            txid,
                            record.state()
                        )),
                    ));
                }

                Ok(vec![
                    ParticipantAction::Log(WalRecord::Abort { txid: txid.clone() }),
                    ParticipantAction::Update(ParticipantTransaction::aborted(txid)),
                    ParticipantAction::Reply(ParticipantReply::State(ParticipantState::Aborted)),
                    ParticipantAction::Notify(ParticipantActionNotification::Aborted),
                ])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::two_phase_commit::Operation;

    fn context(record: Option<ParticipantTransaction>) -> ParticipantContext {
        ParticipantContext::new("t1".into(), record)
    }

    /// Test that a supported operation is logged, then recorded as Ready, then answered with
    /// Yes, in that order.
    #[test]
    fn test_prepare_supported_operation() -> Result<(), Box<dyn std::error::Error>> {
        let op = Operation::set("x", 1);
        let actions =
            ParticipantAlgorithm::default().event(ParticipantEvent::Prepare(op.clone()), context(None))?;

        assert_eq!(
            actions,
            vec![
                ParticipantAction::Log(WalRecord::PrepareVote {
                    txid: "t1".into(),
                    vote: Vote::Yes,
                    op: Some(op.clone()),
                }),
                ParticipantAction::Update(ParticipantTransaction::ready("t1".into(), op)),
                ParticipantAction::Reply(ParticipantReply::Vote(Vote::Yes)),
                ParticipantAction::Notify(ParticipantActionNotification::Voted(Vote::Yes)),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_prepare_unsupported_operation() -> Result<(), Box<dyn std::error::Error>> {
        let actions = ParticipantAlgorithm::default()
            .event(ParticipantEvent::Prepare(Operation::delete("x")), context(None))?;

        assert_eq!(
            actions[0],
            ParticipantAction::Log(WalRecord::PrepareVote {
                txid: "t1".into(),
                vote: Vote::No,
                op: None,
            })
        );
        assert_eq!(
            actions[1],
            ParticipantAction::Update(ParticipantTransaction::aborted("t1".into()))
        );
        assert_eq!(actions[2], ParticipantAction::Reply(ParticipantReply::Vote(Vote::No)));

        Ok(())
    }

    /// Test that a prepare for a transaction already voted on is answered with the original
    /// vote and does not write to the log.
    #[test]
    fn test_prepare_redelivered() -> Result<(), Box<dyn std::error::Error>> {
        let algorithm = ParticipantAlgorithm::default();

        let actions = algorithm.event(
            ParticipantEvent::Prepare(Operation::delete("x")),
            context(Some(ParticipantTransaction::ready(
                "t1".into(),
                Operation::set("x", 1),
            ))),
        )?;
        assert_eq!(actions[0], ParticipantAction::Reply(ParticipantReply::Vote(Vote::Yes)));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, ParticipantAction::Log(_))));

        let actions = algorithm.event(
            ParticipantEvent::Prepare(Operation::set("x", 1)),
            context(Some(ParticipantTransaction::aborted("t1".into()))),
        )?;
        assert_eq!(actions[0], ParticipantAction::Reply(ParticipantReply::Vote(Vote::No)));

        Ok(())
    }

    #[test]
    fn test_commit_from_ready() -> Result<(), Box<dyn std::error::Error>> {
        let op = Operation::set("x", 1);
        let actions = ParticipantAlgorithm::default().event(
            ParticipantEvent::Commit,
            context(Some(ParticipantTransaction::ready("t1".into(), op.clone()))),
        )?;

        assert_eq!(
            actions,
            vec![
                ParticipantAction::Log(WalRecord::Commit { txid: "t1".into() }),
                ParticipantAction::Apply(op.clone()),
                ParticipantAction::Update(ParticipantTransaction::committed("t1".into(), op)),
                ParticipantAction::Reply(ParticipantReply::State(ParticipantState::Committed)),
                ParticipantAction::Notify(ParticipantActionNotification::Committed),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_commit_requires_ready() {
        let algorithm = ParticipantAlgorithm::default();

        assert!(matches!(
            algorithm.event(ParticipantEvent::Commit, context(None)),
            Err(AlgorithmError::NotPrepared(txid)) if txid == "t1"
        ));

        assert!(matches!(
            algorithm.event(
                ParticipantEvent::Commit,
                context(Some(ParticipantTransaction::aborted("t1".into())))
            ),
            Err(AlgorithmError::InvalidState(_))
        ));
    }

    /// Test that a commit repeated after the transaction committed is acknowledged without
    /// applying the operation a second time.
    #[test]
    fn test_commit_redelivered() -> Result<(), Box<dyn std::error::Error>> {
        let actions = ParticipantAlgorithm::default().event(
            ParticipantEvent::Commit,
            context(Some(ParticipantTransaction::committed(
                "t1".into(),
                Operation::set("x", 1),
            ))),
        )?;

        assert_eq!(
            actions[0],
            ParticipantAction::Reply(ParticipantReply::State(ParticipantState::Committed))
        );
        assert!(!actions
            .iter()
            .any(|a| matches!(a, ParticipantAction::Apply(_) | ParticipantAction::Log(_))));

        Ok(())
    }

    #[test]
    fn test_abort_from_any_state_but_committed() -> Result<(), Box<dyn std::error::Error>> {
        let algorithm = ParticipantAlgorithm::default();

        for record in [
            None,
            Some(ParticipantTransaction::ready("t1".into(), Operation::set("x", 1))),
            Some(ParticipantTransaction::aborted("t1".into())),
        ] {
            let actions = algorithm.event(ParticipantEvent::Abort, context(record))?;
            assert_eq!(
                actions[0],
                ParticipantAction::Log(WalRecord::Abort { txid: "t1".into() })
            );
            assert_eq!(
                actions[2],
                ParticipantAction::Reply(ParticipantReply::State(ParticipantState::Aborted))
            );
        }

        assert!(matches!(
            algorithm.event(
                ParticipantEvent::Abort,
                context(Some(ParticipantTransaction::committed(
                    "t1".into(),
                    Operation::set("x", 1)
                )))
            ),
            Err(AlgorithmError::InvalidState(_))
        ));

        Ok(())
    }
}
