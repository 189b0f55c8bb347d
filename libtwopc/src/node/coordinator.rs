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
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::algorithm::Algorithm;
use crate::error::{CoordinatorError, InternalError, TransportError};
use crate::links::ParticipantClient;
use crate::registry::{TransactionRecord, TransactionRegistry};
use crate::two_phase_commit::{
    validate_txid, CoordinatorAction, CoordinatorActionNotification, CoordinatorAlgorithm,
    CoordinatorContext, CoordinatorEvent, CoordinatorState, CoordinatorTransaction, Decision,
    Operation, ParticipantState, TxId, Vote,
};
use crate::wal::WriteAheadLog;

use super::fault::{FaultAction, FaultHook, FaultPoint};

/// The result of a transaction, as returned to the client which started it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionOutcome {
    pub txid: TxId,
    pub decision: Decision,
    pub votes: BTreeMap<String, Vote>,
}

/// A participant which has not acknowledged a decision after the configured number of
/// delivery attempts. Redelivery continues; the alarm is for an operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryAlarm {
    pub txid: TxId,
    pub participant: String,
    pub attempts: u32,
}

/// A snapshot of a coordinator for introspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CoordinatorStatus {
    pub node: String,
    #[serde(rename = "tx")]
    pub transactions: BTreeMap<TxId, CoordinatorTransaction>,
    pub alarms: Vec<DeliveryAlarm>,
}

/// The coordinator: runs each transaction through prepare, decision, and notification.
///
/// Cloning a `CoordinatorNode` produces another handle to the same coordinator.
#[derive(Clone)]
pub struct CoordinatorNode {
    inner: Arc<CoordinatorInner>,
}

pub(super) struct CoordinatorConfig {
    pub(super) node_id: String,
    pub(super) participants: Vec<String>,
    pub(super) timeout: Duration,
    pub(super) max_delivery_attempts: u32,
    pub(super) client: Arc<dyn ParticipantClient>,
    pub(super) fault_hook: Arc<dyn FaultHook>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    algorithm: CoordinatorAlgorithm,
    shared: Mutex<CoordinatorShared>,
}

// Everything that changes while transactions run. Held only for in-memory work plus a log
// append; never across a call to a participant.
struct CoordinatorShared {
    registry: TransactionRegistry<CoordinatorTransaction>,
    wal: Box<dyn WriteAheadLog>,
    failed_deliveries: BTreeMap<(TxId, String), u32>,
}

impl CoordinatorNode {
    pub(super) fn new(config: CoordinatorConfig, wal: Box<dyn WriteAheadLog>) -> Self {
        CoordinatorNode {
            inner: Arc::new(CoordinatorInner {
                config,
                algorithm: CoordinatorAlgorithm::new(),
                shared: Mutex::new(CoordinatorShared {
                    registry: TransactionRegistry::new(),
                    wal,
                    failed_deliveries: BTreeMap::new(),
                }),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.config.node_id
    }

    pub fn participants(&self) -> &[String] {
        &self.inner.config.participants
    }

    /// Runs `op` as transaction `txid` across every participant.
    ///
    /// Participants which fail or do not answer within the configured timeout are recorded as
    /// `NO_TIMEOUT` and force an abort. Decision deliveries which fail are kept for
    /// [`retry_pending`](Self::retry_pending); they do not affect the returned outcome.
    ///
    /// # Errors
    ///
    /// * [`CoordinatorError::InvalidArgument`] if `txid` is not a valid transaction id
    /// * [`CoordinatorError::InvalidState`] if `txid` has been used before
    /// * [`CoordinatorError::Wal`] if the intent or decision could not be logged
    /// * [`CoordinatorError::Halted`] if an injected fault stopped the coordinator
    pub async fn start_transaction<S: Into<TxId>>(
        &self,
        txid: S,
        op: Operation,
    ) -> Result<TransactionOutcome, CoordinatorError> {
        let txid = txid.into();
        validate_txid(&txid)?;

        debug!(
            "[{}] Starting transaction {} with {:?}",
            self.node_id(),
            txid,
            op
        );

        let mut votes = BTreeMap::new();
        for action in self.process(&txid, CoordinatorEvent::Start(op))? {
            if let CoordinatorAction::SendPrepare(op) = action {
                self.check_fault(FaultPoint::AfterPrepareLogged, &txid)
                    .await?;
                votes = self.broadcast_prepare(&txid, &op).await;
            }
        }

        let mut acknowledged = Vec::new();
        for action in self.process(&txid, CoordinatorEvent::VotesCollected(votes))? {
            if let CoordinatorAction::SendDecision {
                decision,
                participants,
            } = action
            {
                self.check_fault(FaultPoint::AfterDecisionLogged, &txid)
                    .await?;
                acknowledged = self
                    .broadcast_decision(&txid, decision, &participants)
                    .await;
            }
        }

        self.process(&txid, CoordinatorEvent::DecisionDelivered { acknowledged })?;

        let record = self.transaction(&txid).ok_or_else(|| {
            InternalError::with_message(format!("transaction {} is missing", txid))
        })?;
        let decision = record.decision().ok_or_else(|| {
            InternalError::with_message(format!("transaction {} has no decision", txid))
        })?;

        Ok(TransactionOutcome {
            txid,
            decision,
            votes: record.votes().clone(),
        })
    }

    /// Redelivers the decision of every finished transaction to the participants which have not
    /// acknowledged it, and returns how many deliveries are still outstanding.
    ///
    /// Redelivery is always safe: the decision is durable and never changes, and participants
    /// acknowledge a repeated decision without acting on it twice.
    pub async fn retry_pending(&self) -> Result<usize, CoordinatorError> {
        let owed: Vec<(TxId, Decision, Vec<String>)> = {
            let shared = self.inner.shared.lock();
            shared
                .registry
                .iter()
                .filter(|record| record.state() == CoordinatorState::Done)
                .filter(|record| !record.pending().is_empty())
                .filter_map(|record| {
                    record.decision().map(|decision| {
                        (
                            record.txid().to_string(),
                            decision,
                            record.pending().iter().cloned().collect(),
                        )
                    })
                })
                .collect()
        };

        if owed.is_empty() {
            return Ok(0);
        }

        let rounds = join_all(owed.iter().map(|(txid, decision, participants)| async move {
            let acknowledged = self
                .broadcast_decision(txid, *decision, participants)
                .await;
            (txid, acknowledged)
        }))
        .await;

        for (txid, acknowledged) in rounds {
            self.process(txid, CoordinatorEvent::DecisionDelivered { acknowledged })?;
        }

        Ok(self.pending_deliveries())
    }

    /// Delivers every decision restored from the log which participants have not acknowledged.
    /// Call once after building a coordinator over an existing log.
    pub async fn recover(&self) -> Result<usize, CoordinatorError> {
        let owed = self.pending_deliveries();
        if owed > 0 {
            info!(
                "[{}] Redelivering {} decisions restored from the log",
                self.node_id(),
                owed
            );
        }

        let remaining = self.retry_pending().await?;
        if remaining > 0 {
            warn!(
                "[{}] {} decisions could not be delivered during recovery",
                self.node_id(),
                remaining
            );
        }

        Ok(remaining)
    }

    /// Spawns a task which calls [`retry_pending`](Self::retry_pending) every `interval` until
    /// the returned handle is aborted.
    pub fn spawn_retry_loop(&self, interval: Duration) -> JoinHandle<()> {
        let node = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match node.retry_pending().await {
                    Ok(0) => (),
                    Ok(remaining) => debug!(
                        "[{}] {} decision deliveries still pending",
                        node.node_id(),
                        remaining
                    ),
                    Err(err) => error!(
                        "[{}] Unable to redeliver decisions: {}",
                        node.node_id(),
                        err
                    ),
                }
            }
        })
    }

    pub fn transaction(&self, txid: &str) -> Option<CoordinatorTransaction> {
        self.inner.shared.lock().registry.get(txid).cloned()
    }

    pub fn status(&self) -> CoordinatorStatus {
        let shared = self.inner.shared.lock();
        let max = self.inner.config.max_delivery_attempts;

        CoordinatorStatus {
            node: self.node_id().to_string(),
            transactions: shared.registry.snapshot(),
            alarms: shared
                .failed_deliveries
                .iter()
                .filter(|(_, attempts)| **attempts >= max)
                .map(|((txid, participant), attempts)| DeliveryAlarm {
                    txid: txid.clone(),
                    participant: participant.clone(),
                    attempts: *attempts,
                })
                .collect(),
        }
    }

    // The number of (transaction, participant) pairs still owed a decision.
    fn pending_deliveries(&self) -> usize {
        self.inner
            .shared
            .lock()
            .registry
            .iter()
            .filter(|record| record.state() == CoordinatorState::Done)
            .map(|record| record.pending().len())
            .sum()
    }

    // Run an event through the algorithm, performing the local actions under the lock in the
    // order given. The actions which leave the node are returned to be performed by the caller
    // once the lock is released.
    pub(super) fn process(
        &self,
        txid: &str,
        event: CoordinatorEvent,
    ) -> Result<Vec<CoordinatorAction>, CoordinatorError> {
        let mut shared = self.inner.shared.lock();

        let context = CoordinatorContext::new(
            txid.to_string(),
            self.inner.config.participants.clone(),
            shared.registry.get(txid).cloned(),
        );
        let actions = self.inner.algorithm.event(event, context)?;

        let mut outbound = Vec::new();
        for action in actions {
            match action {
                CoordinatorAction::Log(record) => {
                    shared.wal.append(&record).map_err(|err| {
                        error!(
                            "[{}] Unable to log {}: {}",
                            self.node_id(),
                            record,
                            err
                        );
                        CoordinatorError::Wal(err)
                    })?;
                }
                CoordinatorAction::Update(record) => shared.registry.put(record),
                CoordinatorAction::Notify(notification) => self.notify(txid, notification),
                send => outbound.push(send),
            }
        }

        Ok(outbound)
    }

    async fn check_fault(&self, point: FaultPoint, txid: &str) -> Result<(), CoordinatorError> {
        match self.inner.config.fault_hook.at(point, txid) {
            FaultAction::Continue => Ok(()),
            FaultAction::Delay(delay) => {
                warn!(
                    "[{}] Injected delay of {:?} at {:?} for {}",
                    self.node_id(),
                    delay,
                    point,
                    txid
                );
                tokio::time::sleep(delay).await;
                Ok(())
            }
            FaultAction::Crash => {
                error!(
                    "[{}] Injected crash at {:?} for {}",
                    self.node_id(),
                    point,
                    txid
                );
                Err(CoordinatorError::Halted {
                    txid: txid.to_string(),
                    point,
                })
            }
        }
    }

    // Ask every participant to prepare, all at once. Each call is bounded by the timeout, so
    // the round takes no longer than one timeout however many participants there are.
    async fn broadcast_prepare(&self, txid: &str, op: &Operation) -> BTreeMap<String, Vote> {
        let timeout = self.inner.config.timeout;
        let client = &self.inner.config.client;

        let calls = self.participants().iter().map(|participant| async move {
            let vote =
                match tokio::time::timeout(timeout, client.prepare(participant, txid, op)).await {
                    Ok(Ok(vote)) => vote,
                    Ok(Err(err)) => {
                        warn!(
                            "[{}] Prepare of {} failed at {}: {}",
                            self.node_id(),
                            txid,
                            participant,
                            err
                        );
                        Vote::NoTimeout
                    }
                    Err(_) => {
                        warn!(
                            "[{}] Prepare of {} failed at {}: {}",
                            self.node_id(),
                            txid,
                            participant,
                            TransportError::Timeout(timeout)
                        );
                        Vote::NoTimeout
                    }
                };

            (participant.clone(), vote)
        });

        join_all(calls).await.into_iter().collect()
    }

    // Deliver the decision to the given participants, all at once, and return those which
    // acknowledged it. Failures are counted towards the delivery alarm.
    async fn broadcast_decision(
        &self,
        txid: &str,
        decision: Decision,
        participants: &[String],
    ) -> Vec<String> {
        let timeout = self.inner.config.timeout;
        let client = &self.inner.config.client;

        let calls = participants.iter().map(|participant| async move {
            let (call, expected) = match decision {
                Decision::Commit => (client.commit(participant, txid), ParticipantState::Committed),
                Decision::Abort => (client.abort(participant, txid), ParticipantState::Aborted),
            };

            let result = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(state)) if state == expected => Ok(()),
                Ok(Ok(state)) => Err(TransportError::Rejected(format!(
                    "participant answered {} to {}",
                    state, decision
                ))),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(TransportError::Timeout(timeout)),
            };

            (participant, result)
        });

        let mut acknowledged = Vec::new();
        let mut failed = Vec::new();
        for (participant, result) in join_all(calls).await {
            match result {
                Ok(()) => acknowledged.push(participant.clone()),
                Err(err) => {
                    warn!(
                        "[{}] Delivery of {} for {} to {} failed: {}",
                        self.node_id(),
                        decision,
                        txid,
                        participant,
                        err
                    );
                    failed.push(participant.clone());
                }
            }
        }

        self.count_delivery_failures(txid, decision, &acknowledged, &failed);

        acknowledged
    }

    fn count_delivery_failures(
        &self,
        txid: &str,
        decision: Decision,
        acknowledged: &[String],
        failed: &[String],
    ) {
        let max = self.inner.config.max_delivery_attempts;
        let mut shared = self.inner.shared.lock();

        for participant in acknowledged {
            shared
                .failed_deliveries
                .remove(&(txid.to_string(), participant.clone()));
        }

        for participant in failed {
            let attempts = shared
                .failed_deliveries
                .entry((txid.to_string(), participant.clone()))
                .or_insert(0);
            *attempts += 1;

            if *attempts == max {
                error!(
                    "[{}] ALARM: {} for {} has not been delivered to {} after {} attempts",
                    self.node_id(),
                    decision,
                    txid,
                    participant,
                    attempts
                );
            }
        }
    }

    fn notify(&self, txid: &str, notification: CoordinatorActionNotification) {
        match notification {
            CoordinatorActionNotification::Decided(decision) => {
                info!("[{}] Decided {} for {}", self.node_id(), decision, txid)
            }
            CoordinatorActionNotification::Completed => {
                debug!("[{}] Every participant acknowledged {}", self.node_id(), txid)
            }
            CoordinatorActionNotification::PresumedAbort => info!(
                "[{}] Transaction {} was never decided; aborting",
                self.node_id(),
                txid
            ),
            CoordinatorActionNotification::InDoubt(decision) => info!(
                "[{}] Transaction {} decided {} awaits delivery",
                self.node_id(),
                txid,
                decision
            ),
        }
    }
}
