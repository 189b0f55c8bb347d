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

//! Contains ParticipantError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use crate::two_phase_commit::TxId;

use super::AlgorithmError;
use super::InternalError;
use super::InvalidArgumentError;
use super::InvalidStateError;

/// An error returned by a participant node in response to a prepare, commit, or abort request.
///
/// When an error is returned, the participant's registry, store, and log are unchanged.
#[derive(Debug)]
pub enum ParticipantError {
    InvalidArgument(InvalidArgumentError),

    /// Commit was requested for a transaction this participant never prepared.
    TransactionNotPrepared(TxId),

    /// The requested transition is not allowed from the transaction's current state, such as a
    /// commit after an abort or an abort after a commit.
    InvalidStateTransition(InvalidStateError),

    /// The write-ahead log could not durably record the event; no reply may be sent.
    Wal(InternalError),

    Internal(InternalError),
}

impl Error for ParticipantError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParticipantError::InvalidArgument(e) => Some(e),
            ParticipantError::TransactionNotPrepared(_) => None,
            ParticipantError::InvalidStateTransition(e) => Some(e),
            ParticipantError::Wal(e) => Some(e),
            ParticipantError::Internal(e) => Some(e),
        }
    }
}

impl Display for ParticipantError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            ParticipantError::InvalidArgument(e) => write!(f, "{}", e),
            ParticipantError::TransactionNotPrepared(txid) => {
                write!(f, "transaction {} has not been prepared", txid)
            }
            ParticipantError::InvalidStateTransition(e) => {
                write!(f, "invalid state transition: {}", e)
            }
            ParticipantError::Wal(e) => write!(f, "unable to write to the log: {}", e),
            ParticipantError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<AlgorithmError> for ParticipantError {
    fn from(err: AlgorithmError) -> Self {
        match err {
            AlgorithmError::NotPrepared(txid) => ParticipantError::TransactionNotPrepared(txid),
            AlgorithmError::InvalidState(e) => ParticipantError::InvalidStateTransition(e),
            AlgorithmError::Internal(e) => ParticipantError::Internal(e),
        }
    }
}

impl From<InvalidArgumentError> for ParticipantError {
    fn from(err: InvalidArgumentError) -> Self {
        ParticipantError::InvalidArgument(err)
    }
}

impl From<InternalError> for ParticipantError {
    fn from(err: InternalError) -> Self {
        ParticipantError::Internal(err)
    }
}
