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

//! Contains TransportError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::time::Duration;

/// A failure to complete a call to a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The participant did not answer within the per-call timeout.
    Timeout(Duration),

    /// The participant could not be reached.
    Unreachable(String),

    /// The participant answered with an error.
    Rejected(String),
}

impl Error for TransportError {}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            TransportError::Timeout(timeout) => {
                write!(f, "no response within {} ms", timeout.as_millis())
            }
            TransportError::Unreachable(participant) => {
                write!(f, "participant {} is unreachable", participant)
            }
            TransportError::Rejected(msg) => write!(f, "request rejected: {}", msg),
        }
    }
}
