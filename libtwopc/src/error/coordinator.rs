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

//! Contains CoordinatorError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use crate::node::FaultPoint;
use crate::two_phase_commit::TxId;

use super::AlgorithmError;
use super::InternalError;
use super::InvalidArgumentError;
use super::InvalidStateError;

/// An error returned by the coordinator.
///
/// Transport failures never appear here: during prepare they become `NO_TIMEOUT` votes, and
/// during notification they are queued for redelivery.
#[derive(Debug)]
pub enum CoordinatorError {
    InvalidArgument(InvalidArgumentError),

    /// The request conflicts with the coordinator's state, such as a reused transaction id.
    InvalidState(InvalidStateError),

    /// The write-ahead log could not durably record the event.
    Wal(InternalError),

    /// The coordinator stopped at an injected crash point. Any decision already logged is
    /// delivered after the coordinator is rebuilt from its log.
    Halted { txid: TxId, point: FaultPoint },

    Internal(InternalError),
}

impl Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoordinatorError::InvalidArgument(e) => Some(e),
            CoordinatorError::InvalidState(e) => Some(e),
            CoordinatorError::Wal(e) => Some(e),
            CoordinatorError::Halted { .. } => None,
            CoordinatorError::Internal(e) => Some(e),
        }
    }
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            CoordinatorError::InvalidArgument(e) => write!(f, "{}", e),
            CoordinatorError::InvalidState(e) => write!(f, "{}", e),
            CoordinatorError::Wal(e) => write!(f, "unable to write to the log: {}", e),
            CoordinatorError::Halted { txid, point } => {
                write!(f, "coordinator halted at {:?} for transaction {}", point, txid)
            }
            CoordinatorError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<AlgorithmError> for CoordinatorError {
    fn from(err: AlgorithmError) -> Self {
        match err {
            AlgorithmError::NotPrepared(txid) => {
                CoordinatorError::InvalidState(InvalidStateError::with_message(format!(
                    "transaction {} has not been started",
                    txid
                )))
            }
            AlgorithmError::InvalidState(e) => CoordinatorError::InvalidState(e),
            AlgorithmError::Internal(e) => CoordinatorError::Internal(e),
        }
    }
}

impl From<InvalidArgumentError> for CoordinatorError {
    fn from(err: InvalidArgumentError) -> Self {
        CoordinatorError::InvalidArgument(err)
    }
}

impl From<InvalidStateError> for CoordinatorError {
    fn from(err: InvalidStateError) -> Self {
        CoordinatorError::InvalidState(err)
    }
}

impl From<InternalError> for CoordinatorError {
    fn from(err: InternalError) -> Self {
        CoordinatorError::Internal(err)
    }
}
