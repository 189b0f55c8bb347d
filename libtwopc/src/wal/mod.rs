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

//! The write-ahead log used by both roles.
//!
//! Every protocol event that a node promises to remember is appended here, and made durable,
//! before the node tells anyone about it. On restart, [`WriteAheadLog::replay`] returns the
//! records in the order they were written, which is the authoritative event order for the node.

mod file;
mod memory;
mod record;

pub use file::FileWal;
pub use memory::MemoryWal;
pub use record::WalRecord;

use crate::error::InternalError;

/// An append-only, durable record of protocol events.
///
/// Records are never rewritten or removed.
pub trait WriteAheadLog: Send {
    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns an [`InternalError`] if the record could not be made durable. In that case the
    /// caller must not act as if the event had happened.
    fn append(&mut self, record: &WalRecord) -> Result<(), InternalError>;

    /// Returns every record in the log, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an [`InternalError`] if the log could not be read or a record could not be
    /// parsed.
    fn replay(&self) -> Result<Vec<WalRecord>, InternalError>;
}
