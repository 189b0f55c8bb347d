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

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::InternalError;

use super::WalRecord;
use super::WriteAheadLog;

/// A write-ahead log stored in a single append-only file, one record per line.
///
/// Every append is flushed and synced before it returns.
pub struct FileWal {
    path: PathBuf,
    file: File,
}

impl FileWal {
    /// Opens the log at `path`, creating an empty log if the file does not exist.
    ///
    /// An incomplete record left at the end of the file by an interrupted append is cut off, so
    /// that new records start on a line of their own.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, InternalError> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                InternalError::from_source_with_message(
                    Box::new(err),
                    format!("unable to open log {}", path.display()),
                )
            })?;

        let mut wal = FileWal { path, file };
        wal.truncate_torn_tail()?;

        Ok(wal)
    }

    fn truncate_torn_tail(&mut self) -> Result<(), InternalError> {
        let contents = fs::read(&self.path).map_err(|err| self.io_error(err, "read"))?;

        let complete = contents
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map(|newline| newline + 1)
            .unwrap_or(0);

        if complete < contents.len() {
            warn!(
                "Truncating {} bytes of an incomplete record at the end of {}",
                contents.len() - complete,
                self.path.display()
            );
            self.truncate(complete as u64)
                .map_err(|err| self.io_error(err, "truncate"))?;
        }

        Ok(())
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.file.set_len(len)?;
        self.file.sync_data()
    }

    fn io_error(&self, err: std::io::Error, action: &str) -> InternalError {
        InternalError::from_source_with_message(
            Box::new(err),
            format!("unable to {} log {}", action, self.path.display()),
        )
    }
}

impl WriteAheadLog for FileWal {
    fn append(&mut self, record: &WalRecord) -> Result<(), InternalError> {
        // The line is written with a single call so that a crash can tear at most the final
        // line, which replay discards.
        let line = format!("{}\n", record);

        let len = self
            .file
            .metadata()
            .map_err(|err| self.io_error(err, "inspect"))?
            .len();

        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data());

        if let Err(err) = written {
            // Remove whatever part of the line reached the file, so the next append does not
            // land on the end of a fragment.
            if let Err(truncate_err) = self.truncate(len) {
                error!(
                    "Unable to remove a partial record from {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(self.io_error(err, "append to"));
        }

        Ok(())
    }

    fn replay(&self) -> Result<Vec<WalRecord>, InternalError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(InternalError::from_source_with_message(
                    Box::new(err),
                    format!("unable to read log {}", self.path.display()),
                ))
            }
        };

        let mut lines: Vec<&str> = contents.split('\n').collect();

        // Everything after the final newline was never acknowledged.
        if let Some(torn) = lines.pop() {
            if !torn.is_empty() {
                warn!(
                    "Discarding incomplete record at the end of {}: {:?}",
                    self.path.display(),
                    torn
                );
            }
        }

        lines
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.parse::<WalRecord>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::two_phase_commit::{Decision, Operation, Vote};

    #[test]
    fn test_append_and_replay() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("node.wal");

        let records = vec![
            WalRecord::PrepareVote {
                txid: "t1".into(),
                vote: Vote::Yes,
                op: Some(Operation::set("x", 1)),
            },
            WalRecord::Commit { txid: "t1".into() },
            WalRecord::Decision {
                txid: "t2".into(),
                decision: Decision::Abort,
            },
        ];

        let mut wal = FileWal::open(&path)?;
        for record in &records {
            wal.append(record)?;
        }
        assert_eq!(wal.replay()?, records);

        // A reopened log appends after the existing records.
        drop(wal);
        let mut wal = FileWal::open(&path)?;
        wal.append(&WalRecord::End { txid: "t2".into() })?;

        let replayed = wal.replay()?;
        assert_eq!(replayed.len(), 4);
        assert_eq!(replayed[..3], records[..]);
        assert_eq!(fs::read_to_string(&path)?.lines().last(), Some("t2 END"));

        Ok(())
    }

    /// Test that a partially written final line is dropped, but a corrupt line in the middle of
    /// the log fails the replay.
    #[test]
    fn test_replay_torn_and_corrupt_lines() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("node.wal");

        fs::write(&path, "t1 PREPARE\nt1 DECISION COMMIT\nt1 EN")?;
        let wal = FileWal::open(&path)?;
        assert_eq!(wal.replay()?.len(), 2);

        fs::write(&path, "t1 PREPARE\ngarbage\nt1 DECISION COMMIT\n")?;
        assert!(wal.replay().is_err());

        Ok(())
    }

    /// Test that reopening a log with an incomplete final record cuts the fragment off, so
    /// that records appended afterwards replay cleanly.
    #[test]
    fn test_reopen_truncates_torn_tail() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("coordinator.wal");

        fs::write(&path, "t1 PREPARE\nt1 DECISION COMMIT\nt1 EN")?;

        let mut wal = FileWal::open(&path)?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "t1 PREPARE\nt1 DECISION COMMIT\n"
        );
        wal.append(&WalRecord::End { txid: "t1".into() })?;
        drop(wal);

        let wal = FileWal::open(&path)?;
        assert_eq!(
            wal.replay()?,
            vec![
                WalRecord::Prepare { txid: "t1".into() },
                WalRecord::Decision {
                    txid: "t1".into(),
                    decision: Decision::Commit,
                },
                WalRecord::End { txid: "t1".into() },
            ]
        );

        // A log holding nothing but a fragment becomes empty.
        fs::write(&path, "t2 PREP")?;
        let wal = FileWal::open(&path)?;
        assert!(wal.replay()?.is_empty());
        assert_eq!(fs::read_to_string(&path)?, "");

        Ok(())
    }
}
