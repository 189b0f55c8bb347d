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

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ParticipantError, TransportError};
use crate::node::ParticipantNode;
use crate::two_phase_commit::{Operation, ParticipantState, Vote};

use super::ParticipantClient;

/// A fault applied to every call made to one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkFault {
    /// Calls fail immediately as if the participant were down.
    Unreachable,
    /// Calls are held for the given duration before being delivered.
    Delay(Duration),
}

/// An in-process network which delivers calls directly to registered participant nodes.
///
/// Faults can be set per participant to reproduce unreachable or slow participants, and a
/// participant can be replaced with a node rebuilt from its log to simulate a restart.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    participants: Arc<Mutex<BTreeMap<String, Arc<ParticipantNode>>>>,
    faults: Arc<Mutex<BTreeMap<String, LinkFault>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        LocalNetwork::default()
    }

    /// Registers `node` under `name`, replacing any node previously registered under it.
    pub fn register<S: Into<String>>(&self, name: S, node: Arc<ParticipantNode>) {
        self.participants.lock().insert(name.into(), node);
    }

    /// Removes the participant; calls to it fail as unreachable.
    pub fn deregister(&self, name: &str) -> Option<Arc<ParticipantNode>> {
        self.participants.lock().remove(name)
    }

    pub fn set_fault<S: Into<String>>(&self, name: S, fault: LinkFault) {
        self.faults.lock().insert(name.into(), fault);
    }

    pub fn clear_fault(&self, name: &str) {
        self.faults.lock().remove(name);
    }

    // Apply any fault configured for the participant, then look it up. Locks are released
    // before any delay.
    async fn route(&self, participant: &str) -> Result<Arc<ParticipantNode>, TransportError> {
        let fault = self.faults.lock().get(participant).copied();

        match fault {
            Some(LinkFault::Unreachable) => {
                return Err(TransportError::Unreachable(participant.to_string()))
            }
            Some(LinkFault::Delay(delay)) => tokio::time::sleep(delay).await,
            None => (),
        }

        self.participants
            .lock()
            .get(participant)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(participant.to_string()))
    }
}

fn rejected(err: ParticipantError) -> TransportError {
    TransportError::Rejected(err.to_string())
}

#[async_trait]
impl ParticipantClient for LocalNetwork {
    async fn prepare(
        &self,
        participant: &str,
        txid: &str,
        op: &Operation,
    ) -> Result<Vote, TransportError> {
        self.route(participant)
            .await?
            .prepare(txid, op.clone())
            .map_err(rejected)
    }

    async fn commit(
        &self,
        participant: &str,
        txid: &str,
    ) -> Result<ParticipantState, TransportError> {
        self.route(participant).await?.commit(txid).map_err(rejected)
    }

    async fn abort(
        &self,
        participant: &str,
        txid: &str,
    ) -> Result<ParticipantState, TransportError> {
        self.route(participant).await?.abort(txid).map_err(rejected)
    }
}
