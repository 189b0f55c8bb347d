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

//! The link between a coordinator and its participants.
//!
//! The coordinator only needs three calls to reach a participant: prepare, commit, and abort.
//! How they travel (framing, addressing, retries at the transport level) belongs to the
//! implementation of [`ParticipantClient`]. A call may be dropped, delayed, or fail on its own;
//! the coordinator bounds every call with its own timeout and treats any failure as a missing
//! answer.

#[cfg(feature = "local-network")]
mod local;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::two_phase_commit::{Operation, ParticipantState, Vote};

#[cfg(feature = "local-network")]
pub use local::{LinkFault, LocalNetwork};

/// The coordinator's side of the link to every participant.
#[async_trait]
pub trait ParticipantClient: Send + Sync {
    /// Ask `participant` to prepare `op` for transaction `txid`.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] is returned if the participant could not be reached or did not
    /// answer.
    async fn prepare(
        &self,
        participant: &str,
        txid: &str,
        op: &Operation,
    ) -> Result<Vote, TransportError>;

    /// Deliver a commit decision to `participant`.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] is returned if the participant could not be reached or refused the
    /// commit.
    async fn commit(&self, participant: &str, txid: &str)
        -> Result<ParticipantState, TransportError>;

    /// Deliver an abort decision to `participant`.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] is returned if the participant could not be reached or refused the
    /// abort.
    async fn abort(&self, participant: &str, txid: &str)
        -> Result<ParticipantState, TransportError>;
}
