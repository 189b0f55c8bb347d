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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::InternalError;

use super::WalRecord;
use super::WriteAheadLog;

/// A log held in memory.
///
/// Clones share the same records, so a test can keep a handle to inspect what a node wrote, or
/// hand the same log to a rebuilt node to simulate a restart. Appends can be made to fail to
/// exercise the paths where nothing may be externalized.
#[derive(Clone, Default)]
pub struct MemoryWal {
    records: Arc<Mutex<Vec<WalRecord>>>,
    fail_appends: Arc<AtomicBool>,
}

impl MemoryWal {
    pub fn new() -> Self {
        MemoryWal::default()
    }

    pub fn records(&self) -> Vec<WalRecord> {
        self.records.lock().clone()
    }

    /// Causes every following append to fail until reset.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl WriteAheadLog for MemoryWal {
    fn append(&mut self, record: &WalRecord) -> Result<(), InternalError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(InternalError::with_message(format!(
                "injected failure appending {}",
                record
            )));
        }

        self.records.lock().push(record.clone());
        Ok(())
    }

    fn replay(&self) -> Result<Vec<WalRecord>, InternalError> {
        Ok(self.records())
    }
}
