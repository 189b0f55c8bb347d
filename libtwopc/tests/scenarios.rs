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

//! End-to-end runs of a coordinator against participants on a local network.

#![cfg(feature = "local-network")]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;

use twopc::error::TransportError;
use twopc::links::{LinkFault, LocalNetwork, ParticipantClient};
use twopc::node::{CoordinatorBuilder, CoordinatorNode, ParticipantBuilder, ParticipantNode};
use twopc::two_phase_commit::{Decision, Operation, OperationType, ParticipantState, Vote};
use twopc::wal::{MemoryWal, WalRecord};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn participant(
    network: &LocalNetwork,
    name: &str,
    supported: &[OperationType],
) -> Arc<ParticipantNode> {
    let node = Arc::new(
        ParticipantBuilder::new()
            .with_node_id(name)
            .with_wal(MemoryWal::new())
            .with_supported_operations(supported.iter().cloned())
            .build()
            .expect("unable to build participant"),
    );
    network.register(name, node.clone());
    node
}

fn coordinator<C: ParticipantClient + 'static>(
    client: C,
    wal: &MemoryWal,
    participants: &[&str],
) -> CoordinatorNode {
    CoordinatorBuilder::new()
        .with_node_id("coordinator")
        .with_participants(participants.iter().copied())
        .with_timeout(Duration::from_millis(500))
        .with_client(client)
        .with_wal(wal.clone())
        .build()
        .expect("unable to build coordinator")
}

/// Two participants which both accept SET commit the same value.
#[tokio::test]
async fn scenario_all_participants_commit() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let network = LocalNetwork::new();
    let p1 = participant(&network, "p1", &[OperationType::Set]);
    let p2 = participant(&network, "p2", &[OperationType::Set]);
    let node = coordinator(network.clone(), &MemoryWal::new(), &["p1", "p2"]);

    let outcome = node.start_transaction("t1", Operation::set("x", 1)).await?;

    assert_eq!(outcome.txid, "t1");
    assert_eq!(outcome.decision, Decision::Commit);
    assert!(outcome.votes.values().all(|vote| *vote == Vote::Yes));
    assert_eq!(p1.get("x"), Some(json!(1)));
    assert_eq!(p2.get("x"), Some(json!(1)));

    Ok(())
}

/// A DELETE sent to participants which only accept SET is voted down everywhere.
#[tokio::test]
async fn scenario_unsupported_operation_aborts() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let network = LocalNetwork::new();
    let p1 = participant(&network, "p1", &[OperationType::Set]);
    let p2 = participant(&network, "p2", &[OperationType::Set]);
    let node = coordinator(network.clone(), &MemoryWal::new(), &["p1", "p2"]);

    node.start_transaction("t1", Operation::set("x", 1)).await?;
    let outcome = node.start_transaction("t2", Operation::delete("x")).await?;

    assert_eq!(outcome.decision, Decision::Abort);
    assert_eq!(outcome.votes.get("p1"), Some(&Vote::No));
    assert_eq!(outcome.votes.get("p2"), Some(&Vote::No));
    assert_eq!(p1.get("x"), Some(json!(1)));
    assert_eq!(p2.get("x"), Some(json!(1)));

    Ok(())
}

/// One participant voting NO leaves every store untouched, including the yes-voter's.
#[tokio::test]
async fn scenario_single_no_vote_aborts() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let network = LocalNetwork::new();
    let p1 = participant(&network, "p1", &[OperationType::Set]);
    let p2 = participant(&network, "p2", &[OperationType::Delete]);
    let node = coordinator(network.clone(), &MemoryWal::new(), &["p1", "p2"]);

    let outcome = node.start_transaction("t1", Operation::set("x", 1)).await?;

    assert_eq!(outcome.decision, Decision::Abort);
    assert_eq!(outcome.votes.get("p1"), Some(&Vote::Yes));
    assert_eq!(outcome.votes.get("p2"), Some(&Vote::No));
    assert!(p1.status().store.is_empty());
    assert!(p2.status().store.is_empty());
    assert_eq!(
        p1.transaction("t1").map(|t| t.state()),
        Some(ParticipantState::Aborted)
    );

    Ok(())
}

/// An unreachable participant counts as NO_TIMEOUT, and receives the abort once it is back.
#[tokio::test]
async fn scenario_unreachable_participant_aborts() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let network = LocalNetwork::new();
    let p1 = participant(&network, "p1", &[OperationType::Set]);
    let p2 = participant(&network, "p2", &[OperationType::Set]);
    network.set_fault("p2", LinkFault::Unreachable);
    let wal = MemoryWal::new();
    let node = coordinator(network.clone(), &wal, &["p1", "p2"]);

    let outcome = node.start_transaction("t1", Operation::set("x", 1)).await?;

    assert_eq!(outcome.decision, Decision::Abort);
    assert_eq!(outcome.votes.get("p2"), Some(&Vote::NoTimeout));
    assert_eq!(p1.get("x"), None);
    assert!(p2.transaction("t1").is_none());
    assert!(!wal.records().contains(&WalRecord::End { txid: "t1".into() }));

    network.clear_fault("p2");
    assert_eq!(node.retry_pending().await?, 0);
    assert_eq!(
        p2.transaction("t1").map(|t| t.state()),
        Some(ParticipantState::Aborted)
    );
    assert!(wal.records().contains(&WalRecord::End { txid: "t1".into() }));

    Ok(())
}

/// The background retry loop delivers a decision once the participant is back on the network.
#[tokio::test]
async fn retry_loop_delivers_after_participant_returns() -> Result<(), Box<dyn std::error::Error>>
{
    init_logging();
    let network = LocalNetwork::new();
    participant(&network, "p1", &[OperationType::Set]);
    let p2 = participant(&network, "p2", &[OperationType::Set]);
    assert!(network.deregister("p2").is_some());
    let node = coordinator(network.clone(), &MemoryWal::new(), &["p1", "p2"]);

    let outcome = node.start_transaction("t1", Operation::set("x", 1)).await?;
    assert_eq!(outcome.votes.get("p2"), Some(&Vote::NoTimeout));
    let handle = node.spawn_retry_loop(Duration::from_millis(20));

    network.register("p2", p2.clone());
    for _ in 0..100 {
        if p2.transaction("t1").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();

    assert_eq!(
        p2.transaction("t1").map(|t| t.state()),
        Some(ParticipantState::Aborted)
    );

    Ok(())
}

/// Distinct transactions run concurrently against the same participants.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transactions_commit() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let network = LocalNetwork::new();
    let p1 = participant(&network, "p1", &[OperationType::Set]);
    let p2 = participant(&network, "p2", &[OperationType::Set]);
    let node = coordinator(network.clone(), &MemoryWal::new(), &["p1", "p2"]);

    let runs = (0..16).map(|i| {
        let node = node.clone();
        async move {
            node.start_transaction(format!("t{}", i), Operation::set(format!("k{}", i), i))
                .await
        }
    });

    for outcome in join_all(runs).await {
        assert_eq!(outcome?.decision, Decision::Commit);
    }

    assert_eq!(p1.status().store.len(), 16);
    assert_eq!(p2.status().store.get("k7"), Some(&json!(7)));

    Ok(())
}

/// Wraps the local network and checks, at each commit or abort it carries, that the decision
/// is already in the coordinator's log.
struct DecisionCheckingClient {
    network: LocalNetwork,
    wal: MemoryWal,
    violations: Arc<Mutex<Vec<String>>>,
    delivered: Arc<Mutex<usize>>,
}

impl DecisionCheckingClient {
    fn check(&self, txid: &str) {
        let logged = self
            .wal
            .records()
            .iter()
            .any(|record| matches!(record, WalRecord::Decision { txid: t, .. } if t == txid));

        if logged {
            *self.delivered.lock() += 1;
        } else {
            self.violations.lock().push(txid.to_string());
        }
    }
}

#[async_trait]
impl ParticipantClient for DecisionCheckingClient {
    async fn prepare(
        &self,
        participant: &str,
        txid: &str,
        op: &Operation,
    ) -> Result<Vote, TransportError> {
        self.network.prepare(participant, txid, op).await
    }

    async fn commit(
        &self,
        participant: &str,
        txid: &str,
    ) -> Result<ParticipantState, TransportError> {
        self.check(txid);
        self.network.commit(participant, txid).await
    }

    async fn abort(
        &self,
        participant: &str,
        txid: &str,
    ) -> Result<ParticipantState, TransportError> {
        self.check(txid);
        self.network.abort(participant, txid).await
    }
}

#[tokio::test]
async fn decision_is_logged_before_it_is_sent() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let network = LocalNetwork::new();
    participant(&network, "p1", &[OperationType::Set]);
    participant(&network, "p2", &[OperationType::Set]);
    let wal = MemoryWal::new();
    let violations = Arc::new(Mutex::new(Vec::new()));
    let delivered = Arc::new(Mutex::new(0));

    let node = coordinator(
        DecisionCheckingClient {
            network: network.clone(),
            wal: wal.clone(),
            violations: violations.clone(),
            delivered: delivered.clone(),
        },
        &wal,
        &["p1", "p2"],
    );

    assert_eq!(
        node.start_transaction("t1", Operation::set("x", 1))
            .await?
            .decision,
        Decision::Commit
    );
    assert_eq!(
        node.start_transaction("t2", Operation::delete("x"))
            .await?
            .decision,
        Decision::Abort
    );

    assert!(violations.lock().is_empty());
    assert_eq!(*delivered.lock(), 4);

    Ok(())
}
