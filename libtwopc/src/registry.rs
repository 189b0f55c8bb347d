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

//! The in-memory map from transaction id to the role-specific transaction record.
//!
//! A registry does no locking of its own; each node keeps its registry inside the single
//! mutex-guarded state it owns, next to its log, so that a record is only ever changed in the
//! same critical section that logs the change.

use std::collections::BTreeMap;

use crate::two_phase_commit::TxId;

/// A record which can be stored in a [`TransactionRegistry`].
pub trait TransactionRecord: Clone {
    fn txid(&self) -> &str;
}

#[derive(Clone, Debug)]
pub struct TransactionRegistry<R> {
    transactions: BTreeMap<TxId, R>,
}

impl<R> Default for TransactionRegistry<R> {
    fn default() -> Self {
        TransactionRegistry {
            transactions: BTreeMap::new(),
        }
    }
}

impl<R> TransactionRegistry<R>
where
    R: TransactionRecord,
{
    pub fn new() -> Self {
        TransactionRegistry::default()
    }

    pub fn get(&self, txid: &str) -> Option<&R> {
        self.transactions.get(txid)
    }

    /// Inserts or replaces the record for the record's transaction id.
    pub fn put(&mut self, record: R) {
        self.transactions.insert(record.txid().to_string(), record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.transactions.values()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// A copy of every record, keyed by transaction id, for introspection.
    pub fn snapshot(&self) -> BTreeMap<TxId, R> {
        self.transactions.clone()
    }
}
