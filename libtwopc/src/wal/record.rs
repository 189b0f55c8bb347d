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

use crate::error::InternalError;
use crate::two_phase_commit::{Decision, Operation, TxId, Vote};

/// One durable event, written as a single line.
///
/// The line grammar is:
///
/// ```text
/// <txid> PREPARE
/// <txid> PREPARE YES <operation as JSON>
/// <txid> PREPARE NO
/// <txid> DECISION COMMIT|ABORT
/// <txid> COMMIT
/// <txid> ABORT
/// <txid> END
/// ```
///
/// `PREPARE` (no vote), `DECISION`, and `END` are written by a coordinator; the rest by a
/// participant.
#[derive(Clone, Debug, PartialEq)]
pub enum WalRecord {
    /// The coordinator intends to run the transaction.
    Prepare { txid: TxId },
    /// A participant's vote. A `Yes` vote carries the operation the participant has promised to
    /// apply if the coordinator decides to commit.
    PrepareVote {
        txid: TxId,
        vote: Vote,
        op: Option<Operation>,
    },
    Decision { txid: TxId, decision: Decision },
    Commit { txid: TxId },
    Abort { txid: TxId },
    /// Every participant has acknowledged the decision; nothing remains to redeliver.
    End { txid: TxId },
}

impl fmt::Display for WalRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalRecord::Prepare { txid } => write!(f, "{} PREPARE", txid),
            WalRecord::PrepareVote {
                txid,
                vote,
                op: Some(op),
            } => {
                let op = serde_json::to_string(op).map_err(|_| fmt::Error)?;
                write!(f, "{} PREPARE {} {}", txid, vote, op)
            }
            WalRecord::PrepareVote {
                txid,
                vote,
                op: None,
            } => write!(f, "{} PREPARE {}", txid, vote),
            WalRecord::Decision { txid, decision } => write!(f, "{} DECISION {}", txid, decision),
            WalRecord::Commit { txid } => write!(f, "{} COMMIT", txid),
            WalRecord::Abort { txid } => write!(f, "{} ABORT", txid),
            WalRecord::End { txid } => write!(f, "{} END", txid),
        }
    }
}

impl FromStr for WalRecord {
    type Err = InternalError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || InternalError::with_message(format!("invalid log record {:?}", line));

        let mut parts = line.splitn(3, ' ');
        let txid = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let kind = parts.next().ok_or_else(invalid)?;
        let rest = parts.next();
        let txid = txid.to_string();

        match (kind, rest) {
            ("PREPARE", None) => Ok(WalRecord::Prepare { txid }),
            ("PREPARE", Some(rest)) => {
                let (vote, op) = match rest.split_once(' ') {
                    Some((vote, op)) => (vote, Some(op)),
                    None => (rest, None),
                };
                let vote = match vote.parse::<Vote>()? {
                    Vote::NoTimeout => return Err(invalid()),
                    vote => vote,
                };
                let op = op
                    .map(|op| {
                        serde_json::from_str::<Operation>(op).map_err(|err| {
                            InternalError::from_source_with_message(
                                Box::new(err),
                                format!("invalid operation in log record {:?}", line),
                            )
                        })
                    })
                    .transpose()?;
                Ok(WalRecord::PrepareVote { txid, vote, op })
            }
            ("DECISION", Some(decision)) => Ok(WalRecord::Decision {
                txid,
                decision: decision.parse()?,
            }),
            ("COMMIT", None) => Ok(WalRecord::Commit { txid }),
            ("ABORT", None) => Ok(WalRecord::Abort { txid }),
            ("END", None) => Ok(WalRecord::End { txid }),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that each record kind is written using the documented line grammar and reads back
    /// to the same record.
    #[test]
    fn test_record_lines() -> Result<(), Box<dyn std::error::Error>> {
        let cases = vec![
            (
                WalRecord::Prepare { txid: "t1".into() },
                "t1 PREPARE".to_string(),
            ),
            (
                WalRecord::PrepareVote {
                    txid: "t1".into(),
                    vote: Vote::Yes,
                    op: Some(Operation::set("x", "hello world")),
                },
                r#"t1 PREPARE YES {"type":"SET","key":"x","value":"hello world"}"#.to_string(),
            ),
            (
                WalRecord::PrepareVote {
                    txid: "t1".into(),
                    vote: Vote::No,
                    op: None,
                },
                "t1 PREPARE NO".to_string(),
            ),
            (
                WalRecord::Decision {
                    txid: "t1".into(),
                    decision: Decision::Commit,
                },
                "t1 DECISION COMMIT".to_string(),
            ),
            (WalRecord::Commit { txid: "t1".into() }, "t1 COMMIT".into()),
            (WalRecord::Abort { txid: "t1".into() }, "t1 ABORT".into()),
            (WalRecord::End { txid: "t1".into() }, "t1 END".into()),
        ];

        for (record, line) in cases {
            assert_eq!(record.to_string(), line);
            assert_eq!(line.parse::<WalRecord>()?, record);
        }

        Ok(())
    }

    #[test]
    fn test_rejects_malformed_lines() {
        for line in [
            "",
            "t1",
            "t1 COMMITTED",
            "t1 DECISION MAYBE",
            "t1 DECISION",
            "t1 PREPARE NO_TIMEOUT",
            "t1 PREPARE YES {not json",
            "t1 END now",
        ] {
            assert!(line.parse::<WalRecord>().is_err(), "{:?} parsed", line);
        }
    }
}
