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

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::{InvalidArgumentError, ParticipantError};
use crate::two_phase_commit::{OperationType, ParticipantAlgorithm};
use crate::wal::{FileWal, WriteAheadLog};

use super::participant::ParticipantShared;
use super::ParticipantNode;

/// Builds a [`ParticipantNode`], restoring its state from the log.
#[derive(Default)]
pub struct ParticipantBuilder {
    node_id: Option<String>,
    wal: Option<Box<dyn WriteAheadLog>>,
    wal_path: Option<PathBuf>,
    supported_operations: Option<BTreeSet<OperationType>>,
}

impl ParticipantBuilder {
    pub fn new() -> Self {
        ParticipantBuilder::default()
    }

    pub fn with_node_id<S: Into<String>>(mut self, node_id: S) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_wal<W: WriteAheadLog + 'static>(mut self, wal: W) -> Self {
        self.wal = Some(Box::new(wal));
        self
    }

    /// Use a file-backed log at `path`. Ignored if a log was given with `with_wal`.
    pub fn with_wal_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.wal_path = Some(path.into());
        self
    }

    /// The operation types this participant votes yes on. Defaults to `SET` only.
    pub fn with_supported_operations<I>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = OperationType>,
    {
        self.supported_operations = Some(operations.into_iter().collect());
        self
    }

    pub fn build(self) -> Result<ParticipantNode, ParticipantError> {
        let node_id = self.node_id.ok_or_else(|| {
            InvalidArgumentError::new("node_id".to_string(), "node_id is required".to_string())
        })?;

        let wal = match (self.wal, self.wal_path) {
            (Some(wal), _) => wal,
            (None, Some(path)) => Box::new(FileWal::open(path)?) as Box<dyn WriteAheadLog>,
            (None, None) => {
                return Err(InvalidArgumentError::new(
                    "wal".to_string(),
                    "a log or a log path is required".to_string(),
                )
                .into())
            }
        };

        let algorithm = match self.supported_operations {
            Some(operations) => ParticipantAlgorithm::new(operations),
            None => ParticipantAlgorithm::default(),
        };

        let shared = ParticipantShared::restore(wal)?;

        Ok(ParticipantNode::new(node_id, algorithm, shared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::two_phase_commit::{Operation, Vote};

    #[test]
    fn test_build_requires_node_id_and_wal() {
        assert!(matches!(
            ParticipantBuilder::new().with_wal_path("unused.wal").build(),
            Err(ParticipantError::InvalidArgument(_))
        ));
        assert!(matches!(
            ParticipantBuilder::new().with_node_id("p1").build(),
            Err(ParticipantError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_build_with_supported_operations() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;

        let node = ParticipantBuilder::new()
            .with_node_id("p1")
            .with_wal_path(dir.path().join("p1.wal"))
            .with_supported_operations(vec![OperationType::Delete])
            .build()?;

        assert_eq!(node.node_id(), "p1");
        assert_eq!(node.prepare("t1", Operation::set("x", 1))?, Vote::No);
        assert_eq!(node.prepare("t2", Operation::delete("x"))?, Vote::Yes);

        Ok(())
    }
}
