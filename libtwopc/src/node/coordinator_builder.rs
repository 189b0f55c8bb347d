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
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoordinatorError, InternalError, InvalidArgumentError};
use crate::links::ParticipantClient;
use crate::two_phase_commit::{CoordinatorEvent, Decision, TxId};
use crate::wal::{FileWal, WalRecord, WriteAheadLog};

use super::coordinator::CoordinatorConfig;
use super::fault::{FaultHook, NoFaults};
use super::CoordinatorNode;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 10;

/// Builds a [`CoordinatorNode`], restoring its transactions from the log.
///
/// Transactions found in the log without a decision are aborted while building. Decisions which
/// were not acknowledged by every participant are delivered by
/// [`CoordinatorNode::recover`].
#[derive(Default)]
pub struct CoordinatorBuilder {
    node_id: Option<String>,
    participants: Option<Vec<String>>,
    timeout: Option<Duration>,
    max_delivery_attempts: Option<u32>,
    wal: Option<Box<dyn WriteAheadLog>>,
    wal_path: Option<PathBuf>,
    client: Option<Arc<dyn ParticipantClient>>,
    fault_hook: Option<Arc<dyn FaultHook>>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        CoordinatorBuilder::default()
    }

    pub fn with_node_id<S: Into<String>>(mut self, node_id: S) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = Some(participants.into_iter().map(Into::into).collect());
        self
    }

    /// The bound on each call to a participant. Defaults to two seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The number of failed deliveries of a decision to one participant after which an alarm is
    /// raised. Defaults to 10.
    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = Some(attempts);
        self
    }

    pub fn with_wal<W: WriteAheadLog + 'static>(mut self, wal: W) -> Self {
        self.wal = Some(Box::new(wal));
        self
    }

    /// Use a file-backed log at `path`. Ignored if a log was given with `with_wal`.
    pub fn with_wal_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.wal_path = Some(path.into());
        self
    }

    pub fn with_client<C: ParticipantClient + 'static>(mut self, client: C) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    pub fn with_fault_hook<H: FaultHook + 'static>(mut self, hook: H) -> Self {
        self.fault_hook = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<CoordinatorNode, CoordinatorError> {
        let node_id = self.node_id.ok_or_else(|| {
            InvalidArgumentError::new("node_id".to_string(), "node_id is required".to_string())
        })?;

        let participants = self.participants.ok_or_else(|| {
            InvalidArgumentError::new(
                "participants".to_string(),
                "participants are required".to_string(),
            )
        })?;

        if participants.is_empty() {
            return Err(InvalidArgumentError::new(
                "participants".to_string(),
                "at least one participant is required".to_string(),
            )
            .into());
        }

        let unique = participants.iter().collect::<BTreeSet<_>>();
        if unique.len() != participants.len() {
            return Err(InvalidArgumentError::new(
                "participants".to_string(),
                "participants must be unique".to_string(),
            )
            .into());
        }

        let client = self.client.ok_or_else(|| {
            InvalidArgumentError::new("client".to_string(), "client is required".to_string())
        })?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(InvalidArgumentError::new(
                "timeout".to_string(),
                "timeout must be greater than zero".to_string(),
            )
            .into());
        }

        let max_delivery_attempts = self
            .max_delivery_attempts
            .unwrap_or(DEFAULT_MAX_DELIVERY_ATTEMPTS);

        let wal = match (self.wal, self.wal_path) {
            (Some(wal), _) => wal,
            (None, Some(path)) => Box::new(FileWal::open(path)?) as Box<dyn WriteAheadLog>,
            (None, None) => {
                return Err(InvalidArgumentError::new(
                    "wal".to_string(),
                    "a log or a log path is required".to_string(),
                )
                .into())
            }
        };

        let restored = summarize(wal.replay()?)?;

        let node = CoordinatorNode::new(
            CoordinatorConfig {
                node_id,
                participants,
                timeout,
                max_delivery_attempts,
                client,
                fault_hook: self.fault_hook.unwrap_or_else(|| Arc::new(NoFaults)),
            },
            wal,
        );

        let count = restored.len();
        for (txid, (decision, ended)) in restored {
            // Actions which leave the node are left to `recover`.
            node.process(&txid, CoordinatorEvent::Recover { decision, ended })?;
        }

        if count > 0 {
            info!(
                "[{}] Restored {} transactions from the log",
                node.node_id(),
                count
            );
        }

        Ok(node)
    }
}

// Fold the log into the last decision and whether an END was written, for each transaction.
fn summarize(
    records: Vec<WalRecord>,
) -> Result<BTreeMap<TxId, (Option<Decision>, bool)>, InternalError> {
    let mut restored: BTreeMap<TxId, (Option<Decision>, bool)> = BTreeMap::new();

    for record in records {
        match record {
            WalRecord::Prepare { txid } => {
                restored.entry(txid).or_insert((None, false));
            }
            WalRecord::Decision { txid, decision } => {
                restored.entry(txid).or_insert((None, false)).0 = Some(decision);
            }
            WalRecord::End { txid } => {
                restored.entry(txid).or_insert((None, false)).1 = true;
            }
            other => {
                return Err(InternalError::with_message(format!(
                    "{} does not belong in a coordinator log",
                    other
                )))
            }
        }
    }

    Ok(restored)
}

#[cfg(all(test, feature = "local-network"))]
mod tests {
    use super::*;

    use crate::links::LocalNetwork;
    use crate::two_phase_commit::CoordinatorState;
    use crate::wal::MemoryWal;

    fn builder(wal: MemoryWal) -> CoordinatorBuilder {
        CoordinatorBuilder::new()
            .with_node_id("coordinator")
            .with_participants(vec!["p1", "p2"])
            .with_client(LocalNetwork::new())
            .with_wal(wal)
    }

    /// Test that each required setting is checked.
    #[test]
    fn test_build_requires_settings() {
        let missing_id = CoordinatorBuilder::new()
            .with_participants(vec!["p1"])
            .with_client(LocalNetwork::new())
            .with_wal(MemoryWal::new())
            .build();
        assert!(matches!(
            missing_id,
            Err(CoordinatorError::InvalidArgument(_))
        ));

        let missing_client = CoordinatorBuilder::new()
            .with_node_id("coordinator")
            .with_participants(vec!["p1"])
            .with_wal(MemoryWal::new())
            .build();
        assert!(matches!(
            missing_client,
            Err(CoordinatorError::InvalidArgument(_))
        ));

        let no_participants = CoordinatorBuilder::new()
            .with_node_id("coordinator")
            .with_participants(Vec::<String>::new())
            .with_client(LocalNetwork::new())
            .with_wal(MemoryWal::new())
            .build();
        assert!(matches!(
            no_participants,
            Err(CoordinatorError::InvalidArgument(_))
        ));

        let duplicates = CoordinatorBuilder::new()
            .with_node_id("coordinator")
            .with_participants(vec!["p1", "p1"])
            .with_client(LocalNetwork::new())
            .with_wal(MemoryWal::new())
            .build();
        assert!(matches!(
            duplicates,
            Err(CoordinatorError::InvalidArgument(_))
        ));
    }

    /// Test that a transaction logged without a decision is aborted while building, and the
    /// abort is itself logged.
    #[test]
    fn test_build_presumes_abort() {
        let wal = MemoryWal::new();
        let mut log = wal.clone();
        log.append(&WalRecord::Prepare {
            txid: "t1".to_string(),
        })
        .expect("unable to append");

        let node = builder(wal.clone()).build().expect("unable to build");

        let record = node.transaction("t1").expect("t1 not restored");
        assert_eq!(record.decision(), Some(Decision::Abort));
        assert_eq!(record.state(), CoordinatorState::Done);
        assert_eq!(record.pending().len(), 2);

        assert_eq!(
            wal.records(),
            vec![
                WalRecord::Prepare {
                    txid: "t1".to_string()
                },
                WalRecord::Decision {
                    txid: "t1".to_string(),
                    decision: Decision::Abort
                },
            ]
        );
    }

    /// Test that ended transactions are restored as complete and decided ones as owed to every
    /// participant.
    #[test]
    fn test_build_restores_decisions() {
        let wal = MemoryWal::new();
        let mut log = wal.clone();
        for record in [
            WalRecord::Prepare {
                txid: "t1".to_string(),
            },
            WalRecord::Decision {
                txid: "t1".to_string(),
                decision: Decision::Commit,
            },
            WalRecord::End {
                txid: "t1".to_string(),
            },
            WalRecord::Prepare {
                txid: "t2".to_string(),
            },
            WalRecord::Decision {
                txid: "t2".to_string(),
                decision: Decision::Commit,
            },
        ] {
            log.append(&record).expect("unable to append");
        }

        let node = builder(wal.clone()).build().expect("unable to build");

        let t1 = node.transaction("t1").expect("t1 not restored");
        assert_eq!(t1.state(), CoordinatorState::Done);
        assert!(t1.pending().is_empty());

        let t2 = node.transaction("t2").expect("t2 not restored");
        assert_eq!(t2.decision(), Some(Decision::Commit));
        assert_eq!(t2.pending().len(), 2);

        // Nothing new is logged for transactions which already had a decision.
        assert_eq!(wal.records().len(), 5);
    }

    /// Test that participant records in a coordinator log are rejected.
    #[test]
    fn test_build_rejects_foreign_records() {
        let wal = MemoryWal::new();
        let mut log = wal.clone();
        log.append(&WalRecord::Commit {
            txid: "t1".to_string(),
        })
        .expect("unable to append");

        assert!(matches!(
            builder(wal).build(),
            Err(CoordinatorError::Internal(_))
        ));
    }
}
