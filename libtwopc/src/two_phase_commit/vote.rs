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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InternalError;

/// A participant's answer to a prepare request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vote {
    Yes,
    No,
    /// Recorded by the coordinator when a participant failed to answer in time. Counts as
    /// `No`.
    NoTimeout,
}

impl Vote {
    pub fn is_yes(&self) -> bool {
        matches!(self, Vote::Yes)
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Vote::Yes => f.write_str("YES"),
            Vote::No => f.write_str("NO"),
            Vote::NoTimeout => f.write_str("NO_TIMEOUT"),
        }
    }
}

impl FromStr for Vote {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YES" => Ok(Vote::Yes),
            "NO" => Ok(Vote::No),
            "NO_TIMEOUT" => Ok(Vote::NoTimeout),
            _ => Err(InternalError::with_message(format!("unknown vote {:?}", s))),
        }
    }
}

/// The coordinator's outcome for a transaction. Once logged, a decision never changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Commit,
    Abort,
}

impl Decision {
    /// Applies the unanimity rule: commit only if every vote is `Yes`.
    pub fn from_votes<'a, I>(votes: I) -> Decision
    where
        I: IntoIterator<Item = &'a Vote>,
    {
        if votes.into_iter().all(Vote::is_yes) {
            Decision::Commit
        } else {
            Decision::Abort
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Decision::Commit => f.write_str("COMMIT"),
            Decision::Abort => f.write_str("ABORT"),
        }
    }
}

impl FromStr for Decision {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMMIT" => Ok(Decision::Commit),
            "ABORT" => Ok(Decision::Abort),
            _ => Err(InternalError::with_message(format!(
                "unknown decision {:?}",
                s
            ))),
        }
    }
}
