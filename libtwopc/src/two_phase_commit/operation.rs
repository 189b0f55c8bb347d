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
use serde_json::Value;

use crate::error::InvalidArgumentError;

/// The unique identifier of one transaction attempt.
pub type TxId = String;

/// Checks that a transaction id can be written to the log.
///
/// The log is line oriented and space separated, so an id must be non-empty and must not
/// contain whitespace.
pub fn validate_txid(txid: &str) -> Result<(), InvalidArgumentError> {
    if txid.is_empty() {
        return Err(InvalidArgumentError::new(
            "txid".to_string(),
            "transaction id must not be empty".to_string(),
        ));
    }

    if txid.chars().any(char::is_whitespace) {
        return Err(InvalidArgumentError::new(
            "txid".to_string(),
            format!("transaction id {:?} must not contain whitespace", txid),
        ));
    }

    Ok(())
}

/// The kind of an [`Operation`]. Participants choose which kinds they are able to apply.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationType {
    Set,
    Delete,
    Other(String),
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OperationType::Set => f.write_str("SET"),
            OperationType::Delete => f.write_str("DELETE"),
            OperationType::Other(name) => f.write_str(name),
        }
    }
}

impl FromStr for OperationType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SET" => OperationType::Set,
            "DELETE" => OperationType::Delete,
            other => OperationType::Other(other.to_string()),
        })
    }
}

impl From<String> for OperationType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "SET" => OperationType::Set,
            "DELETE" => OperationType::Delete,
            _ => OperationType::Other(s),
        }
    }
}

impl From<OperationType> for String {
    fn from(op_type: OperationType) -> Self {
        op_type.to_string()
    }
}

/// The single operation a transaction attempts to apply on every participant.
///
/// An operation is immutable once created and is carried verbatim from the coordinator to each
/// participant. The value is opaque to the protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    op_type: OperationType,
    key: String,
    #[serde(default)]
    value: Value,
}

impl Operation {
    pub fn new<K, V>(op_type: OperationType, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Operation {
            op_type,
            key: key.into(),
            value: value.into(),
        }
    }

    /// An operation which sets `key` to `value`.
    pub fn set<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Operation::new(OperationType::Set, key, value)
    }

    pub fn delete<K: Into<String>>(key: K) -> Self {
        Operation::new(OperationType::Delete, key, Value::Null)
    }

    pub fn op_type(&self) -> &OperationType {
        &self.op_type
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}
